//! Resource lifecycle helpers for the Azure backend.

mod network;
mod public_ip;
mod resource_group;
mod vm;

use super::AzureBackend;

const RESOURCES_API_VERSION: &str = "2021-04-01";
const NETWORK_API_VERSION: &str = "2023-09-01";
const COMPUTE_API_VERSION: &str = "2023-09-01";

impl AzureBackend {
    fn group_path(&self, group: &str) -> String {
        format!("{}/resourcegroups/{group}", self.arm.subscription_path())
    }

    fn network_path(&self, group: &str, kind: &str, name: &str) -> String {
        format!(
            "{}/providers/Microsoft.Network/{kind}/{name}",
            self.group_path(group)
        )
    }

    fn compute_path(&self, group: &str, name: &str) -> String {
        format!(
            "{}/providers/Microsoft.Compute/virtualMachines/{name}",
            self.group_path(group)
        )
    }
}
