//! Backend abstraction for the cloud resources a provisioning run touches.
//!
//! Every operation returns only once the provider reports a terminal state
//! for it, so callers can use the returned handle straight away. Handles are
//! snapshots: they describe the resource as it was when the call returned and
//! are never updated in place.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use thiserror::Error;

/// How the provider assigns the address behind a public IP resource.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AllocationMethod {
    /// Address assigned when the resource is attached and released on detach.
    #[default]
    Dynamic,
    /// Address reserved for the lifetime of the resource.
    Static,
}

impl AllocationMethod {
    /// Returns the provider spelling of the allocation method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dynamic => "Dynamic",
            Self::Static => "Static",
        }
    }
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationMethod {
    type Err = BackendError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dynamic" => Ok(Self::Dynamic),
            "static" => Ok(Self::Static),
            other => Err(BackendError::UnknownAllocationMethod(other.to_owned())),
        }
    }
}

/// Handle for a created resource group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceGroupHandle {
    /// Provider assigned resource identifier.
    pub id: String,
    /// Resource group name.
    pub name: String,
    /// Region the group was created in.
    pub location: String,
}

/// Parameters required to create a public IP address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicIpRequest {
    /// Resource name, unique within the resource group.
    pub name: String,
    /// Resource group that owns the address.
    pub resource_group: String,
    /// Target region.
    pub location: String,
    /// Allocation method for the address.
    pub allocation: AllocationMethod,
    /// Optional DNS label; must be unique within the region.
    pub dns_label: Option<String>,
}

impl PublicIpRequest {
    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required field is empty.
    pub fn validate(&self) -> Result<(), BackendError> {
        require("name", &self.name)?;
        require("resource_group", &self.resource_group)?;
        require("location", &self.location)?;
        if let Some(label) = &self.dns_label {
            require("dns_label", label)?;
        }
        Ok(())
    }
}

/// Snapshot of a public IP address resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicIpAddress {
    /// Provider assigned resource identifier.
    pub id: String,
    /// Resource name.
    pub name: String,
    /// Address assigned by the provider, when one has been allocated.
    pub ip_address: Option<String>,
    /// Allocation method the address was created with.
    pub allocation: AllocationMethod,
    /// DNS label, when one was requested.
    pub dns_label: Option<String>,
    /// Fully qualified domain name derived from the DNS label.
    pub fqdn: Option<String>,
}

/// Virtual network the VM is placed in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkSpec {
    /// Virtual network name.
    pub name: String,
    /// Address space of the network in CIDR notation.
    pub address_prefix: String,
    /// Name of the single subnet created inside the network.
    pub subnet_name: String,
    /// Address prefix of the subnet in CIDR notation.
    pub subnet_prefix: String,
}

/// Marketplace image used to boot the VM.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageReference {
    /// Image publisher (for example `Canonical`).
    pub publisher: String,
    /// Image offer.
    pub offer: String,
    /// Image SKU.
    pub sku: String,
    /// Image version or `latest`.
    pub version: String,
}

/// Administrator login configured on the VM.
#[derive(Clone, Eq, PartialEq)]
pub struct VmCredentials {
    /// Administrator user name.
    pub admin_username: String,
    /// Administrator password.
    pub admin_password: String,
}

impl fmt::Debug for VmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmCredentials")
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .finish()
    }
}

/// Parameters required to create a virtual machine with one public IP.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualMachineRequest {
    /// VM name.
    pub name: String,
    /// Resource group that owns the VM and its network resources.
    pub resource_group: String,
    /// Target region.
    pub location: String,
    /// Network the primary interface is attached to.
    pub network: NetworkSpec,
    /// Identifier of the public IP bound to the primary interface.
    pub public_ip_id: String,
    /// Boot image.
    pub image: ImageReference,
    /// Administrator login.
    pub credentials: VmCredentials,
    /// Size (SKU) of the VM, for example `Standard_B1s`.
    pub size: String,
}

impl VirtualMachineRequest {
    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required field is empty.
    pub fn validate(&self) -> Result<(), BackendError> {
        require("name", &self.name)?;
        require("resource_group", &self.resource_group)?;
        require("location", &self.location)?;
        require("network.name", &self.network.name)?;
        require("network.address_prefix", &self.network.address_prefix)?;
        require("network.subnet_name", &self.network.subnet_name)?;
        require("network.subnet_prefix", &self.network.subnet_prefix)?;
        require("public_ip_id", &self.public_ip_id)?;
        require("image.publisher", &self.image.publisher)?;
        require("image.offer", &self.image.offer)?;
        require("image.sku", &self.image.sku)?;
        require("image.version", &self.image.version)?;
        require("credentials.admin_username", &self.credentials.admin_username)?;
        require("credentials.admin_password", &self.credentials.admin_password)?;
        require("size", &self.size)?;
        Ok(())
    }
}

/// Snapshot of a network interface and its primary IP configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkInterfaceHandle {
    /// Provider assigned resource identifier.
    pub id: String,
    /// Interface name.
    pub name: String,
    /// Public IP referenced by the primary IP configuration at read time.
    pub primary_public_ip_id: Option<String>,
}

/// Snapshot of a virtual machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualMachineHandle {
    /// Provider assigned resource identifier.
    pub id: String,
    /// VM name.
    pub name: String,
    /// Resource group that owns the VM.
    pub resource_group: String,
    /// Primary network interface as seen when the snapshot was taken.
    pub primary_nic: NetworkInterfaceHandle,
}

/// Errors raised while building backend requests.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
    /// Raised when an allocation method is neither dynamic nor static.
    #[error("unknown allocation method '{0}' (expected dynamic or static)")]
    UnknownAllocationMethod(String),
}

fn require(field: &str, value: &str) -> Result<(), BackendError> {
    if value.trim().is_empty() {
        return Err(BackendError::Validation(field.to_owned()));
    }
    Ok(())
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Remote operations the provisioning sequencer drives.
///
/// Implementations wait for long-running provider operations to finish
/// before resolving the returned future.
pub trait Backend {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Acquires credentials for subsequent calls.
    fn authenticate(&self) -> BackendFuture<'_, (), Self::Error>;

    /// Creates a resource group.
    fn create_resource_group<'a>(
        &'a self,
        name: &'a str,
        location: &'a str,
    ) -> BackendFuture<'a, ResourceGroupHandle, Self::Error>;

    /// Creates a public IP address.
    fn create_public_ip<'a>(
        &'a self,
        request: &'a PublicIpRequest,
    ) -> BackendFuture<'a, PublicIpAddress, Self::Error>;

    /// Creates a VM, its network and its primary interface bound to the
    /// requested public IP.
    fn create_virtual_machine<'a>(
        &'a self,
        request: &'a VirtualMachineRequest,
    ) -> BackendFuture<'a, VirtualMachineHandle, Self::Error>;

    /// Reads the VM and its primary interface again.
    fn refresh_virtual_machine<'a>(
        &'a self,
        vm: &'a VirtualMachineHandle,
    ) -> BackendFuture<'a, VirtualMachineHandle, Self::Error>;

    /// Resolves the public IP referenced by the snapshot's primary interface.
    ///
    /// The lookup follows the snapshot, so a handle taken before a rebind
    /// still resolves to the previous address.
    fn primary_public_ip<'a>(
        &'a self,
        vm: &'a VirtualMachineHandle,
    ) -> BackendFuture<'a, Option<PublicIpAddress>, Self::Error>;

    /// Replaces the public IP of the interface's primary IP configuration.
    /// `None` detaches the current address.
    fn update_primary_public_ip<'a>(
        &'a self,
        nic: &'a NetworkInterfaceHandle,
        public_ip: Option<&'a PublicIpAddress>,
    ) -> BackendFuture<'a, NetworkInterfaceHandle, Self::Error>;

    /// Deletes a public IP address by resource identifier.
    fn delete_public_ip<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Deletes a resource group and everything inside it. A group that no
    /// longer exists counts as deleted.
    fn delete_resource_group<'a>(&'a self, name: &'a str) -> BackendFuture<'a, (), Self::Error>;
}
