//! Azure Resource Manager implementation of the provisioning backend.

mod auth;
mod client;
mod error;
mod lifecycle;
mod models;
mod operation;

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use crate::backend::{
    Backend, BackendFuture, NetworkInterfaceHandle, PublicIpAddress, PublicIpRequest,
    ResourceGroupHandle, VirtualMachineHandle, VirtualMachineRequest,
};
use crate::config::{Credentials, ProvisionConfig};
use auth::TokenSource;
use client::ArmClient;
use models::Tags;

pub use error::AzureBackendError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Tag naming the tool that created a resource.
pub const CREATED_BY_TAG: &str = "created-by";
/// Tag carrying the run identifier.
pub const RUN_TAG: &str = "pipswap-run";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Backend that provisions resources through the Resource Manager REST API.
pub struct AzureBackend {
    arm: ArmClient,
    tags: Tags,
}

impl fmt::Debug for AzureBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBackend")
            .field("subscription", &self.arm.subscription_path())
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

impl AzureBackend {
    /// Constructs a backend acting for `credentials`, tagging resources with
    /// `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AzureBackendError::Config`] when the configuration fails
    /// validation.
    pub fn new(
        config: &ProvisionConfig,
        credentials: Credentials,
        run_id: &str,
    ) -> Result<Self, AzureBackendError> {
        config.validate()?;
        let auth = TokenSource::new(
            HTTP_CLIENT.clone(),
            credentials,
            &config.authority_host,
            &config.management_endpoint,
        );
        let arm = ArmClient::new(
            HTTP_CLIENT.clone(),
            &config.management_endpoint,
            auth,
            config.poll_interval(),
            config.operation_timeout(),
        );
        let tags = Tags::from([
            (CREATED_BY_TAG.to_owned(), String::from("pipswap")),
            (RUN_TAG.to_owned(), run_id.to_owned()),
        ]);
        Ok(Self { arm, tags })
    }

    /// Overrides the operation polling interval and timeout.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.arm.poll_interval = interval;
        self.arm.wait_timeout = timeout;
        self
    }
}

impl Backend for AzureBackend {
    type Error = AzureBackendError;

    fn authenticate(&self) -> BackendFuture<'_, (), Self::Error> {
        Box::pin(async move { self.arm.authenticate().await })
    }

    fn create_resource_group<'a>(
        &'a self,
        name: &'a str,
        location: &'a str,
    ) -> BackendFuture<'a, ResourceGroupHandle, Self::Error> {
        Box::pin(async move { self.create_group(name, location).await })
    }

    fn create_public_ip<'a>(
        &'a self,
        request: &'a PublicIpRequest,
    ) -> BackendFuture<'a, PublicIpAddress, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            self.create_address(request).await
        })
    }

    fn create_virtual_machine<'a>(
        &'a self,
        request: &'a VirtualMachineRequest,
    ) -> BackendFuture<'a, VirtualMachineHandle, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            self.create_vm(request).await
        })
    }

    fn refresh_virtual_machine<'a>(
        &'a self,
        vm: &'a VirtualMachineHandle,
    ) -> BackendFuture<'a, VirtualMachineHandle, Self::Error> {
        Box::pin(async move { self.read_vm(&vm.id, &vm.resource_group).await })
    }

    fn primary_public_ip<'a>(
        &'a self,
        vm: &'a VirtualMachineHandle,
    ) -> BackendFuture<'a, Option<PublicIpAddress>, Self::Error> {
        Box::pin(async move {
            match &vm.primary_nic.primary_public_ip_id {
                Some(id) => self.read_address(id).await.map(Some),
                None => Ok(None),
            }
        })
    }

    fn update_primary_public_ip<'a>(
        &'a self,
        nic: &'a NetworkInterfaceHandle,
        public_ip: Option<&'a PublicIpAddress>,
    ) -> BackendFuture<'a, NetworkInterfaceHandle, Self::Error> {
        Box::pin(async move {
            self.set_nic_public_ip(nic, public_ip.map(|address| address.id.as_str()))
                .await
        })
    }

    fn delete_public_ip<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.delete_address(id).await })
    }

    fn delete_resource_group<'a>(&'a self, name: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.delete_group(name).await })
    }
}
