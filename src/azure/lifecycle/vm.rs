//! Virtual machine creation and refresh.

use tracing::info;

use crate::backend::{VirtualMachineHandle, VirtualMachineRequest};

use super::super::AzureBackend;
use super::super::error::AzureBackendError;
use super::super::models::{
    HardwareProfile, ImageReferenceBody, ManagedDisk, NetworkInterfaceReference,
    NetworkInterfaceReferenceProperties, NetworkProfile, OsDisk, OsProfile, StorageProfile,
    VirtualMachine, VmProperties,
};
use super::COMPUTE_API_VERSION;

const OS_DISK_STORAGE: &str = "Standard_LRS";

impl AzureBackend {
    /// Creates the network, the primary interface bound to the requested
    /// public IP, and finally the VM itself.
    pub(in crate::azure) async fn create_vm(
        &self,
        request: &VirtualMachineRequest,
    ) -> Result<VirtualMachineHandle, AzureBackendError> {
        let group = request.resource_group.as_str();
        let subnet_id = self
            .create_network(&request.network, group, &request.location)
            .await?;
        let nic = self
            .create_interface(
                &request.name,
                group,
                &request.location,
                &subnet_id,
                &request.public_ip_id,
            )
            .await?;
        info!(nic = %nic.name, "network interface created");

        let path = self.compute_path(group, &request.name);
        let body = VirtualMachine {
            location: request.location.clone(),
            tags: self.tags.clone(),
            properties: vm_properties(request, &nic.id),
            ..VirtualMachine::default()
        };
        let vm: VirtualMachine = self
            .arm
            .put_and_wait(&path, COMPUTE_API_VERSION, &body, "create virtual machine")
            .await?;
        let id = if vm.id.is_empty() { path } else { vm.id };
        Ok(VirtualMachineHandle {
            id,
            name: request.name.clone(),
            resource_group: request.resource_group.clone(),
            primary_nic: nic,
        })
    }

    /// Reads the VM and then its primary interface.
    pub(in crate::azure) async fn read_vm(
        &self,
        id: &str,
        group: &str,
    ) -> Result<VirtualMachineHandle, AzureBackendError> {
        let vm: VirtualMachine = self.arm.get(id, COMPUTE_API_VERSION).await?;
        let name = if vm.name.is_empty() {
            id.rsplit('/').next().unwrap_or_default().to_owned()
        } else {
            vm.name.clone()
        };
        let nic_id = vm
            .primary_interface()
            .map(|reference| reference.id.clone())
            .ok_or_else(|| AzureBackendError::MissingPrimaryNic { vm: name.clone() })?;
        let primary_nic = self.read_interface(&nic_id).await?;
        Ok(VirtualMachineHandle {
            id: if vm.id.is_empty() { id.to_owned() } else { vm.id },
            name,
            resource_group: group.to_owned(),
            primary_nic,
        })
    }
}

fn vm_properties(request: &VirtualMachineRequest, nic_id: &str) -> VmProperties {
    VmProperties {
        hardware_profile: Some(HardwareProfile {
            vm_size: request.size.clone(),
        }),
        storage_profile: Some(StorageProfile {
            image_reference: ImageReferenceBody {
                publisher: request.image.publisher.clone(),
                offer: request.image.offer.clone(),
                sku: request.image.sku.clone(),
                version: request.image.version.clone(),
            },
            os_disk: OsDisk {
                create_option: String::from("FromImage"),
                delete_option: String::from("Delete"),
                managed_disk: ManagedDisk {
                    storage_account_type: OS_DISK_STORAGE.to_owned(),
                },
            },
        }),
        os_profile: Some(OsProfile {
            computer_name: request.name.clone(),
            admin_username: request.credentials.admin_username.clone(),
            admin_password: Some(request.credentials.admin_password.clone()),
        }),
        network_profile: NetworkProfile {
            network_interfaces: vec![NetworkInterfaceReference {
                id: nic_id.to_owned(),
                properties: Some(NetworkInterfaceReferenceProperties {
                    primary: Some(true),
                }),
            }],
        },
        provisioning_state: None,
    }
}
