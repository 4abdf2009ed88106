//! Virtual networks and network interfaces.
//!
//! Interface updates are full `PUT`s of the document read back from the
//! provider, so everything this crate does not model survives the round trip.

use serde_json::{Value, json};
use tracing::debug;

use crate::backend::{NetworkInterfaceHandle, NetworkSpec};

use super::super::AzureBackend;
use super::super::error::AzureBackendError;
use super::super::models::{
    AddressSpace, IpConfigProperties, IpConfiguration, NetworkInterface, NicProperties,
    SubResource, Subnet, SubnetProperties, VirtualNetwork, VirtualNetworkProperties,
};
use super::NETWORK_API_VERSION;

const VIRTUAL_NETWORK_KIND: &str = "virtualNetworks";
const NETWORK_INTERFACE_KIND: &str = "networkInterfaces";
const IP_CONFIGURATION_NAME: &str = "ipconfig1";

/// Name of the interface created for `vm`.
fn interface_name(vm: &str) -> String {
    format!("{vm}-nic")
}

impl AzureBackend {
    /// Creates the network and returns the identifier of its subnet.
    pub(in crate::azure) async fn create_network(
        &self,
        spec: &NetworkSpec,
        group: &str,
        location: &str,
    ) -> Result<String, AzureBackendError> {
        let path = self.network_path(group, VIRTUAL_NETWORK_KIND, &spec.name);
        let body = VirtualNetwork {
            location: location.to_owned(),
            tags: self.tags.clone(),
            properties: VirtualNetworkProperties {
                address_space: AddressSpace {
                    address_prefixes: vec![spec.address_prefix.clone()],
                },
                subnets: vec![Subnet {
                    name: spec.subnet_name.clone(),
                    properties: SubnetProperties {
                        address_prefix: Some(spec.subnet_prefix.clone()),
                    },
                    ..Subnet::default()
                }],
                provisioning_state: None,
            },
            ..VirtualNetwork::default()
        };
        let network: VirtualNetwork = self
            .arm
            .put_and_wait(&path, NETWORK_API_VERSION, &body, "create virtual network")
            .await?;
        let subnet_id = network
            .properties
            .subnets
            .into_iter()
            .find(|subnet| subnet.name == spec.subnet_name && !subnet.id.is_empty())
            .map_or_else(|| format!("{path}/subnets/{}", spec.subnet_name), |subnet| subnet.id);
        Ok(subnet_id)
    }

    pub(in crate::azure) async fn create_interface(
        &self,
        vm: &str,
        group: &str,
        location: &str,
        subnet_id: &str,
        public_ip_id: &str,
    ) -> Result<NetworkInterfaceHandle, AzureBackendError> {
        let path = self.network_path(group, NETWORK_INTERFACE_KIND, &interface_name(vm));
        let body = NetworkInterface {
            location: location.to_owned(),
            tags: self.tags.clone(),
            properties: NicProperties {
                ip_configurations: vec![IpConfiguration {
                    name: IP_CONFIGURATION_NAME.to_owned(),
                    properties: IpConfigProperties {
                        primary: Some(true),
                        private_allocation_method: Some(String::from("Dynamic")),
                        subnet: Some(SubResource {
                            id: subnet_id.to_owned(),
                        }),
                        public_ip_address: Some(SubResource {
                            id: public_ip_id.to_owned(),
                        }),
                    },
                }],
                provisioning_state: None,
            },
            ..NetworkInterface::default()
        };
        let nic: NetworkInterface = self
            .arm
            .put_and_wait(&path, NETWORK_API_VERSION, &body, "create network interface")
            .await?;
        Ok(interface_handle(nic, &path))
    }

    pub(in crate::azure) async fn read_interface(
        &self,
        id: &str,
    ) -> Result<NetworkInterfaceHandle, AzureBackendError> {
        let nic: NetworkInterface = self.arm.get(id, NETWORK_API_VERSION).await?;
        Ok(interface_handle(nic, id))
    }

    /// Points the primary IP configuration at `public_ip_id`, or clears the
    /// reference when it is `None`.
    pub(in crate::azure) async fn set_nic_public_ip(
        &self,
        nic: &NetworkInterfaceHandle,
        public_ip_id: Option<&str>,
    ) -> Result<NetworkInterfaceHandle, AzureBackendError> {
        let mut document: Value = self.arm.get(&nic.id, NETWORK_API_VERSION).await?;
        set_primary_public_ip(&mut document, public_ip_id).ok_or_else(|| {
            AzureBackendError::MissingIpConfiguration {
                nic: nic.name.clone(),
            }
        })?;
        debug!(nic = %nic.name, public_ip = ?public_ip_id, "updating network interface");
        let updated: NetworkInterface = self
            .arm
            .put_and_wait(&nic.id, NETWORK_API_VERSION, &document, "update network interface")
            .await?;
        Ok(interface_handle(updated, &nic.id))
    }
}

fn interface_handle(nic: NetworkInterface, path: &str) -> NetworkInterfaceHandle {
    let primary_public_ip_id = nic
        .primary_ip_configuration()
        .and_then(|config| config.properties.public_ip_address.as_ref())
        .map(|address| address.id.clone());
    let name = if nic.name.is_empty() {
        path.rsplit('/').next().unwrap_or_default().to_owned()
    } else {
        nic.name
    };
    NetworkInterfaceHandle {
        id: if nic.id.is_empty() {
            path.to_owned()
        } else {
            nic.id
        },
        name,
        primary_public_ip_id,
    }
}

/// Edits the primary IP configuration of a raw interface document in place.
/// Returns `None` when the document has no IP configuration to edit.
fn set_primary_public_ip(document: &mut Value, public_ip_id: Option<&str>) -> Option<()> {
    let configs = document
        .pointer_mut("/properties/ipConfigurations")?
        .as_array_mut()?;
    let index = configs
        .iter()
        .position(|config| {
            config.pointer("/properties/primary").and_then(Value::as_bool) == Some(true)
        })
        .unwrap_or(0);
    let properties = configs
        .get_mut(index)?
        .as_object_mut()?
        .entry("properties")
        .or_insert_with(|| json!({}))
        .as_object_mut()?;
    match public_ip_id {
        Some(id) => {
            properties.insert(String::from("publicIPAddress"), json!({ "id": id }));
        }
        None => {
            properties.remove("publicIPAddress");
        }
    }
    Some(())
}
