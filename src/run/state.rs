//! Per-run state machine and the context threaded through the sequence.

use std::fmt;

use tracing::{debug, info};

use crate::backend::ResourceGroupHandle;

/// Progress of a single provisioning run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    /// Nothing has been issued yet.
    NotStarted,
    /// The resource group exists and is recorded for cleanup.
    GroupCreated,
    /// The first public IP exists.
    FirstAddressCreated,
    /// The VM exists, bound to the first public IP.
    VmCreated,
    /// The second public IP exists.
    SecondAddressCreated,
    /// The VM's interface references the second public IP.
    Rebound,
    /// The VM's interface references no public IP.
    Detached,
    /// The detached public IP has been deleted.
    AddressDeleted,
    /// Teardown of the resource group is in progress.
    CleaningUp,
    /// The resource group has been deleted.
    GroupDeleted,
    /// Deleting the resource group failed.
    CleanupFailed,
}

impl RunState {
    /// Returns `true` for states no further transition leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::GroupDeleted | Self::CleanupFailed)
    }

    /// Returns `true` when moving from `self` to `next` is a legal step.
    #[must_use]
    pub const fn permits(self, next: Self) -> bool {
        match (self, next) {
            (Self::NotStarted, Self::GroupCreated)
            | (Self::GroupCreated, Self::FirstAddressCreated)
            | (Self::FirstAddressCreated, Self::VmCreated)
            | (Self::VmCreated, Self::SecondAddressCreated)
            | (Self::SecondAddressCreated, Self::Rebound)
            | (Self::Rebound, Self::Detached)
            | (Self::Detached, Self::AddressDeleted)
            | (Self::CleaningUp, Self::GroupDeleted | Self::CleanupFailed) => true,
            (from, Self::CleaningUp) => !from.is_terminal() && !matches!(from, Self::CleaningUp),
            _ => false,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::GroupCreated => "group-created",
            Self::FirstAddressCreated => "first-address-created",
            Self::VmCreated => "vm-created",
            Self::SecondAddressCreated => "second-address-created",
            Self::Rebound => "rebound",
            Self::Detached => "detached",
            Self::AddressDeleted => "address-deleted",
            Self::CleaningUp => "cleaning-up",
            Self::GroupDeleted => "group-deleted",
            Self::CleanupFailed => "cleanup-failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable record of one run, owned by the sequencer and handed to the
/// teardown stage.
#[derive(Clone, Debug)]
pub struct RunContext {
    state: RunState,
    history: Vec<RunState>,
    resource_group: Option<ResourceGroupHandle>,
    bound_address: Option<String>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    /// Creates a context in [`RunState::NotStarted`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RunState::NotStarted,
            history: vec![RunState::NotStarted],
            resource_group: None,
            bound_address: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Every state the run has been in, oldest first.
    #[must_use]
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Public IP the run last observed on the VM's primary interface.
    #[must_use]
    pub fn bound_address(&self) -> Option<&str> {
        self.bound_address.as_deref()
    }

    pub(crate) fn record_resource_group(&mut self, handle: ResourceGroupHandle) {
        self.resource_group = Some(handle);
        self.advance(RunState::GroupCreated);
    }

    pub(crate) const fn take_resource_group(&mut self) -> Option<ResourceGroupHandle> {
        self.resource_group.take()
    }

    pub(crate) fn observe_binding(&mut self, public_ip_id: Option<String>) {
        debug!(public_ip = ?public_ip_id, "observed primary interface binding");
        self.bound_address = public_ip_id;
    }

    pub(crate) fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.permits(next),
            "illegal run transition {} -> {next}",
            self.state
        );
        info!(from = %self.state, to = %next, "run state changed");
        self.state = next;
        self.history.push(next);
    }
}
