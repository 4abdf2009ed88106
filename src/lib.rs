//! Core library for the `pipswap` provisioning tool.
//!
//! The crate drives one short-lived Azure deployment: a resource group, a VM
//! and two public IP addresses. The VM's primary interface is moved from the
//! first address to the second, detached, and the detached address deleted.
//! Whatever happens, the resource group is deleted at the end of the run.
//!
//! The [`backend::Backend`] trait abstracts the provider so the sequencer can
//! be exercised against the in-memory [`test_support::FakeCloud`].

pub mod azure;
pub mod backend;
pub mod config;
pub mod logging;
pub mod names;
pub mod run;
pub mod test_support;

pub use azure::{AzureBackend, AzureBackendError};
pub use backend::{
    AllocationMethod, Backend, BackendError, NetworkInterfaceHandle, PublicIpAddress,
    PublicIpRequest, ResourceGroupHandle, VirtualMachineHandle, VirtualMachineRequest,
};
pub use config::{ConfigError, Credentials, CredentialsError, ProvisionConfig};
pub use names::RunNames;
pub use run::{
    CleanupOutcome, ProvisioningSequencer, RunContext, RunError, RunFailure, RunPlan, RunReport,
    RunState, Step,
};
