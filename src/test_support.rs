//! Test support utilities shared across unit and integration tests.
//!
//! [`FakeCloud`] is an in-memory [`Backend`] that models just enough of the
//! provider to hold the sequencer to account: a bound address cannot be
//! deleted, DNS labels are unique, deleting a group cascades and is
//! idempotent, and reads resolve through the snapshot they are given.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::env;
use std::ffi::OsString;
use std::future::ready;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::backend::{
    AllocationMethod, Backend, BackendError, BackendFuture, NetworkInterfaceHandle,
    PublicIpAddress, PublicIpRequest, ResourceGroupHandle, VirtualMachineHandle,
    VirtualMachineRequest,
};
use crate::config::{Credentials, ProvisionConfig};
use crate::names::RunNames;

const FAKE_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

/// Configuration with the built-in defaults spelled out.
#[must_use]
pub fn sample_config() -> ProvisionConfig {
    ProvisionConfig {
        location: String::from("westus"),
        vm_size: String::from("Standard_B1s"),
        image_publisher: String::from("Canonical"),
        image_offer: String::from("0001-com-ubuntu-server-jammy"),
        image_sku: String::from("22_04-lts-gen2"),
        image_version: String::from("latest"),
        admin_username: String::from("pipswapadmin"),
        admin_password: None,
        allocation_method: String::from("Dynamic"),
        network_address_prefix: String::from("10.0.0.0/28"),
        name_prefix: String::from("pipswap"),
        poll_interval_secs: 5,
        operation_timeout_secs: 900,
        management_endpoint: String::from("https://management.azure.com"),
        authority_host: String::from("https://login.microsoftonline.com"),
    }
}

/// Credentials for tenant `tenant-1` and subscription `sub-1`.
#[must_use]
pub fn sample_credentials() -> Credentials {
    Credentials {
        client_id: String::from("client-1"),
        client_secret: String::from("secret-1"),
        tenant_id: String::from("tenant-1"),
        subscription_id: String::from("sub-1"),
    }
}

/// Names used by the reference end-to-end scenario.
#[must_use]
pub fn sample_names() -> RunNames {
    RunNames {
        run_id: String::from("test1"),
        resource_group: String::from("rg-test1"),
        first_address: String::from("pip1-abc"),
        first_dns_label: String::from("dns-pip1-abc"),
        second_address: String::from("pip2-def"),
        second_dns_label: String::from("dns-pip2-def"),
        vm: String::from("vmXYZ"),
        network: String::from("vmXYZ-vnet"),
    }
}

/// Backend operation, used to target failure injection.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// [`Backend::authenticate`].
    Authenticate,
    /// [`Backend::create_resource_group`].
    CreateResourceGroup,
    /// [`Backend::create_public_ip`].
    CreatePublicIp,
    /// [`Backend::create_virtual_machine`].
    CreateVirtualMachine,
    /// [`Backend::refresh_virtual_machine`].
    RefreshVirtualMachine,
    /// [`Backend::primary_public_ip`].
    PrimaryPublicIp,
    /// [`Backend::update_primary_public_ip`] with an address (rebind).
    UpdatePrimaryPublicIp,
    /// [`Backend::update_primary_public_ip`] without an address (detach).
    DetachPublicIp,
    /// [`Backend::delete_public_ip`].
    DeletePublicIp,
    /// [`Backend::delete_resource_group`].
    DeleteResourceGroup,
}

/// Call recorded by [`FakeCloud`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    /// Credentials were requested.
    Authenticate,
    /// A resource group was requested.
    CreateResourceGroup {
        /// Group name.
        name: String,
    },
    /// A public IP was requested.
    CreatePublicIp {
        /// Address name.
        name: String,
    },
    /// A VM was requested.
    CreateVirtualMachine {
        /// VM name.
        name: String,
    },
    /// A VM was re-read.
    RefreshVirtualMachine {
        /// VM name.
        name: String,
    },
    /// A VM's public IP was resolved.
    PrimaryPublicIp {
        /// VM name.
        vm: String,
    },
    /// An interface's public IP was replaced.
    UpdatePrimaryPublicIp {
        /// Interface name.
        nic: String,
        /// Requested address id, `None` for a detach.
        public_ip: Option<String>,
    },
    /// A public IP was deleted.
    DeletePublicIp {
        /// Address id.
        id: String,
        /// Whether an interface referenced the address when the call arrived.
        bound: bool,
    },
    /// A resource group was deleted.
    DeleteResourceGroup {
        /// Group name.
        name: String,
    },
}

/// Errors raised by [`FakeCloud`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FakeCloudError {
    /// Raised for an operation configured to fail.
    #[error("injected failure in {operation:?}")]
    Injected {
        /// Operation that failed.
        operation: Operation,
    },
    /// Raised when a referenced resource does not exist.
    #[error("resource not found: {resource}")]
    NotFound {
        /// Missing resource.
        resource: String,
    },
    /// Raised when a name or DNS label is already taken.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },
    /// Raised when deleting an address an interface still references.
    #[error("public IP {id} is in use by interface {nic}")]
    InUse {
        /// Address id.
        id: String,
        /// Interface referencing it.
        nic: String,
    },
    /// Raised when a request fails validation.
    #[error(transparent)]
    Validation(#[from] BackendError),
}

#[derive(Clone, Debug)]
struct FakeAddress {
    name: String,
    group: String,
    location: String,
    allocation: AllocationMethod,
    dns_label: Option<String>,
    ip_address: Option<String>,
}

#[derive(Clone, Debug)]
struct FakeNic {
    name: String,
    group: String,
    public_ip: Option<String>,
}

#[derive(Clone, Debug)]
struct FakeVm {
    name: String,
    group: String,
    nic_id: String,
}

#[derive(Debug, Default)]
struct CloudState {
    calls: Vec<Call>,
    failures: HashSet<Operation>,
    ignore_rebinds: bool,
    ignore_detaches: bool,
    misreport_detaches: bool,
    groups: BTreeMap<String, String>,
    addresses: BTreeMap<String, FakeAddress>,
    nics: BTreeMap<String, FakeNic>,
    vms: BTreeMap<String, FakeVm>,
    next_host: u8,
}

impl CloudState {
    fn check(&self, operation: Operation) -> Result<(), FakeCloudError> {
        if self.failures.contains(&operation) {
            return Err(FakeCloudError::Injected { operation });
        }
        Ok(())
    }

    fn require_group(&self, name: &str) -> Result<(), FakeCloudError> {
        if self.groups.contains_key(name) {
            Ok(())
        } else {
            Err(FakeCloudError::NotFound {
                resource: format!("resource group {name}"),
            })
        }
    }

    fn allocate_ip(&mut self) -> String {
        self.next_host = self.next_host.wrapping_add(1);
        format!("20.0.0.{}", self.next_host)
    }

    fn nic_referencing(&self, address_id: &str) -> Option<&FakeNic> {
        self.nics
            .values()
            .find(|nic| nic.public_ip.as_deref() == Some(address_id))
    }

    fn bind(&mut self, nic_id: &str, address_id: Option<&str>) -> Result<(), FakeCloudError> {
        if let Some(id) = address_id {
            if !self.addresses.contains_key(id) {
                return Err(FakeCloudError::NotFound {
                    resource: format!("public IP {id}"),
                });
            }
            if let Some(other) = self
                .nics
                .iter()
                .find(|(other_id, nic)| *other_id != nic_id && nic.public_ip.as_deref() == Some(id))
            {
                return Err(FakeCloudError::Conflict {
                    message: format!("public IP {id} is already bound to {}", other.1.name),
                });
            }
        }
        let previous = self
            .nics
            .get(nic_id)
            .ok_or_else(|| FakeCloudError::NotFound {
                resource: format!("network interface {nic_id}"),
            })?
            .public_ip
            .clone();
        if let Some(old) = previous.as_deref().filter(|old| Some(*old) != address_id) {
            self.release(old);
        }
        if let Some(id) = address_id {
            let needs_ip = self
                .addresses
                .get(id)
                .is_some_and(|address| address.ip_address.is_none());
            if needs_ip {
                let ip = self.allocate_ip();
                if let Some(address) = self.addresses.get_mut(id) {
                    address.ip_address = Some(ip);
                }
            }
        }
        if let Some(nic) = self.nics.get_mut(nic_id) {
            nic.public_ip = address_id.map(str::to_owned);
        }
        Ok(())
    }

    fn release(&mut self, address_id: &str) {
        if let Some(address) = self.addresses.get_mut(address_id) {
            if address.allocation == AllocationMethod::Dynamic {
                address.ip_address = None;
            }
        }
    }

    fn address_snapshot(&self, id: &str) -> Result<PublicIpAddress, FakeCloudError> {
        let address = self
            .addresses
            .get(id)
            .ok_or_else(|| FakeCloudError::NotFound {
                resource: format!("public IP {id}"),
            })?;
        Ok(PublicIpAddress {
            id: id.to_owned(),
            name: address.name.clone(),
            ip_address: address.ip_address.clone(),
            allocation: address.allocation,
            dns_label: address.dns_label.clone(),
            fqdn: address
                .dns_label
                .as_ref()
                .map(|label| format!("{label}.{}.cloudapp.azure.com", address.location)),
        })
    }

    fn nic_snapshot(&self, id: &str) -> Result<NetworkInterfaceHandle, FakeCloudError> {
        let nic = self.nics.get(id).ok_or_else(|| FakeCloudError::NotFound {
            resource: format!("network interface {id}"),
        })?;
        Ok(NetworkInterfaceHandle {
            id: id.to_owned(),
            name: nic.name.clone(),
            primary_public_ip_id: nic.public_ip.clone(),
        })
    }

    fn vm_snapshot(&self, id: &str) -> Result<VirtualMachineHandle, FakeCloudError> {
        let vm = self.vms.get(id).ok_or_else(|| FakeCloudError::NotFound {
            resource: format!("virtual machine {id}"),
        })?;
        Ok(VirtualMachineHandle {
            id: id.to_owned(),
            name: vm.name.clone(),
            resource_group: vm.group.clone(),
            primary_nic: self.nic_snapshot(&vm.nic_id)?,
        })
    }
}

fn resource_id(group: &str, provider: &str, kind: &str, name: &str) -> String {
    format!("/subscriptions/{FAKE_SUBSCRIPTION}/resourceGroups/{group}/providers/{provider}/{kind}/{name}")
}

/// In-memory cloud used by tests.
#[derive(Clone, Debug, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    /// Creates an empty cloud.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call of `operation` fail.
    pub fn fail_on(&self, operation: Operation) {
        self.with_state(|state| state.failures.insert(operation));
    }

    /// Makes rebinds report success without changing the interface.
    pub fn ignore_rebinds(&self) {
        self.with_state(|state| state.ignore_rebinds = true);
    }

    /// Makes detaches report success without changing the interface.
    pub fn ignore_detaches(&self) {
        self.with_state(|state| state.ignore_detaches = true);
    }

    /// Makes detaches return an interface without a public IP while the
    /// stored interface keeps its binding, so only a fresh read shows it.
    pub fn misreport_detaches(&self) {
        self.with_state(|state| state.misreport_detaches = true);
    }

    /// Calls received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|state| state.calls.clone())
    }

    /// Number of recorded calls matching `predicate`.
    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.with_state(|state| state.calls.iter().filter(|call| predicate(call)).count())
    }

    /// Returns `true` when a group called `name` exists.
    #[must_use]
    pub fn has_group(&self, name: &str) -> bool {
        self.with_state(|state| state.groups.contains_key(name))
    }

    /// Names of all public IPs that exist.
    #[must_use]
    pub fn address_names(&self) -> BTreeSet<String> {
        self.with_state(|state| {
            state
                .addresses
                .values()
                .map(|address| address.name.clone())
                .collect()
        })
    }

    /// Creates a resource group directly, bypassing the call log.
    pub fn seed_group(&self, name: &str, location: &str) {
        self.with_state(|state| {
            state.groups.insert(name.to_owned(), location.to_owned());
        });
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut CloudState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn respond<T: Send + 'static>(
        &self,
        call: Call,
        operation: Operation,
        f: impl FnOnce(&mut CloudState) -> Result<T, FakeCloudError>,
    ) -> BackendFuture<'_, T, FakeCloudError> {
        let result = self.with_state(|state| {
            state.calls.push(call);
            state.check(operation)?;
            f(state)
        });
        Box::pin(ready(result))
    }
}

impl Backend for FakeCloud {
    type Error = FakeCloudError;

    fn authenticate(&self) -> BackendFuture<'_, (), Self::Error> {
        self.respond(Call::Authenticate, Operation::Authenticate, |_| Ok(()))
    }

    fn create_resource_group<'a>(
        &'a self,
        name: &'a str,
        location: &'a str,
    ) -> BackendFuture<'a, ResourceGroupHandle, Self::Error> {
        let call = Call::CreateResourceGroup {
            name: name.to_owned(),
        };
        self.respond(call, Operation::CreateResourceGroup, |state| {
            state.groups.insert(name.to_owned(), location.to_owned());
            Ok(ResourceGroupHandle {
                id: format!("/subscriptions/{FAKE_SUBSCRIPTION}/resourceGroups/{name}"),
                name: name.to_owned(),
                location: location.to_owned(),
            })
        })
    }

    fn create_public_ip<'a>(
        &'a self,
        request: &'a PublicIpRequest,
    ) -> BackendFuture<'a, PublicIpAddress, Self::Error> {
        let call = Call::CreatePublicIp {
            name: request.name.clone(),
        };
        self.respond(call, Operation::CreatePublicIp, |state| {
            request.validate()?;
            state.require_group(&request.resource_group)?;
            if let Some(label) = &request.dns_label {
                let taken = state.addresses.values().any(|address| {
                    address.location == request.location
                        && address.dns_label.as_deref() == Some(label.as_str())
                });
                if taken {
                    return Err(FakeCloudError::Conflict {
                        message: format!("DNS label {label} is already in use"),
                    });
                }
            }
            let id = resource_id(
                &request.resource_group,
                "Microsoft.Network",
                "publicIPAddresses",
                &request.name,
            );
            if state.addresses.contains_key(&id) {
                return Err(FakeCloudError::Conflict {
                    message: format!("public IP {} already exists", request.name),
                });
            }
            let ip_address = (request.allocation == AllocationMethod::Static)
                .then(|| state.allocate_ip());
            state.addresses.insert(
                id.clone(),
                FakeAddress {
                    name: request.name.clone(),
                    group: request.resource_group.clone(),
                    location: request.location.clone(),
                    allocation: request.allocation,
                    dns_label: request.dns_label.clone(),
                    ip_address,
                },
            );
            state.address_snapshot(&id)
        })
    }

    fn create_virtual_machine<'a>(
        &'a self,
        request: &'a VirtualMachineRequest,
    ) -> BackendFuture<'a, VirtualMachineHandle, Self::Error> {
        let call = Call::CreateVirtualMachine {
            name: request.name.clone(),
        };
        self.respond(call, Operation::CreateVirtualMachine, |state| {
            request.validate()?;
            state.require_group(&request.resource_group)?;
            let nic_name = format!("{}-nic", request.name);
            let nic_id = resource_id(
                &request.resource_group,
                "Microsoft.Network",
                "networkInterfaces",
                &nic_name,
            );
            state.nics.insert(
                nic_id.clone(),
                FakeNic {
                    name: nic_name,
                    group: request.resource_group.clone(),
                    public_ip: None,
                },
            );
            if let Err(err) = state.bind(&nic_id, Some(&request.public_ip_id)) {
                state.nics.remove(&nic_id);
                return Err(err);
            }
            let vm_id = resource_id(
                &request.resource_group,
                "Microsoft.Compute",
                "virtualMachines",
                &request.name,
            );
            state.vms.insert(
                vm_id.clone(),
                FakeVm {
                    name: request.name.clone(),
                    group: request.resource_group.clone(),
                    nic_id,
                },
            );
            state.vm_snapshot(&vm_id)
        })
    }

    fn refresh_virtual_machine<'a>(
        &'a self,
        vm: &'a VirtualMachineHandle,
    ) -> BackendFuture<'a, VirtualMachineHandle, Self::Error> {
        let call = Call::RefreshVirtualMachine {
            name: vm.name.clone(),
        };
        self.respond(call, Operation::RefreshVirtualMachine, |state| {
            state.vm_snapshot(&vm.id)
        })
    }

    fn primary_public_ip<'a>(
        &'a self,
        vm: &'a VirtualMachineHandle,
    ) -> BackendFuture<'a, Option<PublicIpAddress>, Self::Error> {
        let call = Call::PrimaryPublicIp {
            vm: vm.name.clone(),
        };
        self.respond(call, Operation::PrimaryPublicIp, |state| {
            vm.primary_nic
                .primary_public_ip_id
                .as_deref()
                .map(|id| state.address_snapshot(id))
                .transpose()
        })
    }

    fn update_primary_public_ip<'a>(
        &'a self,
        nic: &'a NetworkInterfaceHandle,
        public_ip: Option<&'a PublicIpAddress>,
    ) -> BackendFuture<'a, NetworkInterfaceHandle, Self::Error> {
        let call = Call::UpdatePrimaryPublicIp {
            nic: nic.name.clone(),
            public_ip: public_ip.map(|address| address.id.clone()),
        };
        let operation = if public_ip.is_some() {
            Operation::UpdatePrimaryPublicIp
        } else {
            Operation::DetachPublicIp
        };
        self.respond(call, operation, |state| {
            if public_ip.is_none() && state.misreport_detaches {
                let mut reported = state.nic_snapshot(&nic.id)?;
                reported.primary_public_ip_id = None;
                return Ok(reported);
            }
            let ignored = if public_ip.is_some() {
                state.ignore_rebinds
            } else {
                state.ignore_detaches
            };
            if !ignored {
                state.bind(&nic.id, public_ip.map(|address| address.id.as_str()))?;
            }
            state.nic_snapshot(&nic.id)
        })
    }

    fn delete_public_ip<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        let bound = self.with_state(|state| state.nic_referencing(id).is_some());
        let call = Call::DeletePublicIp {
            id: id.to_owned(),
            bound,
        };
        self.respond(call, Operation::DeletePublicIp, |state| {
            if let Some(nic) = state.nic_referencing(id) {
                return Err(FakeCloudError::InUse {
                    id: id.to_owned(),
                    nic: nic.name.clone(),
                });
            }
            state
                .addresses
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| FakeCloudError::NotFound {
                    resource: format!("public IP {id}"),
                })
        })
    }

    fn delete_resource_group<'a>(&'a self, name: &'a str) -> BackendFuture<'a, (), Self::Error> {
        let call = Call::DeleteResourceGroup {
            name: name.to_owned(),
        };
        self.respond(call, Operation::DeleteResourceGroup, |state| {
            if state.groups.remove(name).is_some() {
                state.vms.retain(|_, vm| vm.group != name);
                state.nics.retain(|_, nic| nic.group != name);
                state.addresses.retain(|_, address| address.group != name);
            }
            Ok(())
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    /// A `None` value removes the variable.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
