//! Resource group creation and teardown.

use tracing::{info, warn};

use crate::backend::ResourceGroupHandle;

use super::super::AzureBackend;
use super::super::error::AzureBackendError;
use super::super::models::ResourceGroup;
use super::RESOURCES_API_VERSION;

impl AzureBackend {
    pub(in crate::azure) async fn create_group(
        &self,
        name: &str,
        location: &str,
    ) -> Result<ResourceGroupHandle, AzureBackendError> {
        let path = self.group_path(name);
        let body = ResourceGroup {
            location: location.to_owned(),
            tags: self.tags.clone(),
            ..ResourceGroup::default()
        };
        let group: ResourceGroup = self
            .arm
            .put_and_wait(&path, RESOURCES_API_VERSION, &body, "create resource group")
            .await?;
        Ok(ResourceGroupHandle {
            id: group.id,
            name: name.to_owned(),
            location: group.location,
        })
    }

    /// Deletes the group and waits for the cascade to finish. A group that is
    /// already gone counts as deleted.
    pub(in crate::azure) async fn delete_group(&self, name: &str) -> Result<(), AzureBackendError> {
        let path = self.group_path(name);
        match self
            .arm
            .delete_and_wait(&path, RESOURCES_API_VERSION, "delete resource group")
            .await
        {
            Ok(()) => {
                info!(resource_group = name, "resource group deleted");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                warn!(resource_group = name, "resource group already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
