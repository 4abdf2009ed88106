//! Resource Manager wire types.
//!
//! Only the fields this crate reads or writes are modelled. Network resources
//! spell `IP` in upper case (`publicIPAddress`), so those fields carry
//! explicit renames rather than relying on `camelCase`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tags attached to every resource a run creates.
pub type Tags = BTreeMap<String, String>;

/// Error envelope returned by Resource Manager.
#[derive(Debug, Deserialize)]
pub struct ArmErrorEnvelope {
    pub error: ArmErrorDetail,
}

/// Code and message of a Resource Manager error.
#[derive(Debug, Default, Deserialize)]
pub struct ArmErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Body of a long-running operation status poll.
#[derive(Debug, Deserialize)]
pub struct OperationStatusBody {
    pub status: String,
    #[serde(default)]
    pub error: Option<ArmErrorDetail>,
}

/// Successful token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Failed token endpoint response.
#[derive(Debug, Default, Deserialize)]
pub struct TokenErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Reference to another resource by id.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SubResource {
    pub id: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ResourceGroup {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ProvisioningProperties>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PublicIpResource {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default, skip_serializing)]
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: Tags,
    pub properties: PublicIpProperties,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpProperties {
    #[serde(rename = "publicIPAllocationMethod")]
    pub allocation_method: String,
    #[serde(default, skip_serializing)]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_settings: Option<DnsSettings>,
    #[serde(default, skip_serializing)]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name_label: Option<String>,
    #[serde(default, skip_serializing)]
    pub fqdn: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VirtualNetwork {
    pub location: String,
    #[serde(default)]
    pub tags: Tags,
    pub properties: VirtualNetworkProperties,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkProperties {
    pub address_space: AddressSpace,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(default, skip_serializing)]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpace {
    pub address_prefixes: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Subnet {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub name: String,
    pub properties: SubnetProperties,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetProperties {
    #[serde(default)]
    pub address_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NetworkInterface {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default, skip_serializing)]
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: Tags,
    pub properties: NicProperties,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NicProperties {
    #[serde(default)]
    pub ip_configurations: Vec<IpConfiguration>,
    #[serde(default, skip_serializing)]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct IpConfiguration {
    pub name: String,
    #[serde(default)]
    pub properties: IpConfigProperties,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct IpConfigProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    #[serde(
        rename = "privateIPAllocationMethod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub private_allocation_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<SubResource>,
    #[serde(
        rename = "publicIPAddress",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub public_ip_address: Option<SubResource>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VirtualMachine {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default, skip_serializing)]
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: Tags,
    pub properties: VmProperties,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_profile: Option<HardwareProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_profile: Option<StorageProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_profile: Option<OsProfile>,
    #[serde(default)]
    pub network_profile: NetworkProfile,
    #[serde(default, skip_serializing)]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub vm_size: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    pub image_reference: ImageReferenceBody,
    pub os_disk: OsDisk,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ImageReferenceBody {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    pub create_option: String,
    pub delete_option: String,
    pub managed_disk: ManagedDisk,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDisk {
    pub storage_account_type: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsProfile {
    pub computer_name: String,
    pub admin_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterfaceReference>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NetworkInterfaceReference {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<NetworkInterfaceReferenceProperties>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NetworkInterfaceReferenceProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
}

impl VirtualMachine {
    /// Primary interface reference: the one flagged primary, else the first.
    pub fn primary_interface(&self) -> Option<&NetworkInterfaceReference> {
        let interfaces = &self.properties.network_profile.network_interfaces;
        interfaces
            .iter()
            .find(|nic| nic.properties.as_ref().and_then(|props| props.primary) == Some(true))
            .or_else(|| interfaces.first())
    }
}

impl NetworkInterface {
    /// Primary IP configuration: the one flagged primary, else the first.
    pub fn primary_ip_configuration(&self) -> Option<&IpConfiguration> {
        let configs = &self.properties.ip_configurations;
        configs
            .iter()
            .find(|config| config.properties.primary == Some(true))
            .or_else(|| configs.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn public_ip_request_uses_network_spelling() {
        let body = PublicIpResource {
            location: String::from("westus"),
            properties: PublicIpProperties {
                allocation_method: String::from("Dynamic"),
                dns_settings: Some(DnsSettings {
                    domain_name_label: Some(String::from("dns-pip1-abc")),
                    fqdn: None,
                }),
                ..PublicIpProperties::default()
            },
            ..PublicIpResource::default()
        };
        let value = serde_json::to_value(&body).expect("serialise");
        assert_eq!(
            value,
            json!({
                "location": "westus",
                "tags": {},
                "properties": {
                    "publicIPAllocationMethod": "Dynamic",
                    "dnsSettings": { "domainNameLabel": "dns-pip1-abc" }
                }
            })
        );
    }

    #[test]
    fn primary_ip_configuration_prefers_flagged_entry() {
        let nic: NetworkInterface = serde_json::from_value(json!({
            "id": "/nic",
            "name": "nic",
            "location": "westus",
            "properties": {
                "ipConfigurations": [
                    { "name": "secondary", "properties": { "primary": false } },
                    {
                        "name": "ipconfig1",
                        "properties": {
                            "primary": true,
                            "publicIPAddress": { "id": "/ip/1" }
                        }
                    }
                ]
            }
        }))
        .expect("deserialise");
        let primary = nic.primary_ip_configuration().expect("primary config");
        assert_eq!(primary.name, "ipconfig1");
        assert_eq!(
            primary
                .properties
                .public_ip_address
                .as_ref()
                .map(|ip| ip.id.as_str()),
            Some("/ip/1")
        );
    }

    #[test]
    fn primary_interface_falls_back_to_first() {
        let vm: VirtualMachine = serde_json::from_value(json!({
            "id": "/vm",
            "name": "vm",
            "location": "westus",
            "properties": {
                "networkProfile": { "networkInterfaces": [ { "id": "/nic/a" }, { "id": "/nic/b" } ] }
            }
        }))
        .expect("deserialise");
        assert_eq!(
            vm.primary_interface().map(|nic| nic.id.as_str()),
            Some("/nic/a")
        );
    }
}
