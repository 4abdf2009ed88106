//! Errors and outcomes surfaced by the provisioning sequencer.

use std::fmt;

use thiserror::Error;

use super::state::RunState;

/// Remote step that was in flight when a backend call failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// Acquiring credentials.
    Authenticate,
    /// Creating the resource group.
    CreateResourceGroup,
    /// Creating the first public IP.
    CreateFirstAddress,
    /// Creating the VM and its network.
    CreateVirtualMachine,
    /// Resolving the VM's current public IP.
    ReadAddress,
    /// Creating the second public IP.
    CreateSecondAddress,
    /// Binding the second public IP to the primary interface.
    Rebind,
    /// Re-reading the VM after a mutation.
    Refresh,
    /// Clearing the primary interface's public IP.
    Detach,
    /// Deleting the detached public IP.
    DeleteAddress,
}

impl Step {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::CreateResourceGroup => "create resource group",
            Self::CreateFirstAddress => "create first public IP",
            Self::CreateVirtualMachine => "create virtual machine",
            Self::ReadAddress => "read public IP",
            Self::CreateSecondAddress => "create second public IP",
            Self::Rebind => "rebind public IP",
            Self::Refresh => "refresh virtual machine",
            Self::Detach => "detach public IP",
            Self::DeleteAddress => "delete public IP",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort the forward sequence.
#[derive(Debug, Error)]
pub enum RunError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when credentials are rejected or cannot be obtained.
    #[error("authentication failed: {0}")]
    Authentication(#[source] BackendError),
    /// Raised when a remote operation fails.
    #[error("{step} failed: {source}")]
    Provider {
        /// Step that issued the failing call.
        step: Step,
        /// Provider-specific error.
        #[source]
        source: BackendError,
    },
    /// Raised when the VM reports no public IP where one is expected.
    #[error("virtual machine {vm} has no public IP address bound to its primary interface")]
    MissingPublicIp {
        /// VM name.
        vm: String,
    },
    /// Raised when a refreshed read does not show the new binding.
    #[error("interface {nic} reports {observed} after rebinding to {expected}")]
    RebindNotObserved {
        /// Interface name.
        nic: String,
        /// Public IP the interface should reference.
        expected: String,
        /// Public IP the interface actually references, or `no address`.
        observed: String,
    },
    /// Raised when a refreshed read still shows a public IP after detach.
    #[error("interface {nic} still references {public_ip} after detach")]
    DetachNotObserved {
        /// Interface name.
        nic: String,
        /// Public IP still referenced.
        public_ip: String,
    },
    /// Raised instead of deleting an address the interface still references.
    #[error("refusing to delete {public_ip} while it is bound to an interface")]
    StillBound {
        /// Public IP that would have been deleted.
        public_ip: String,
    },
}

/// Result of the cleanup stage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CleanupOutcome {
    /// No resource group was created, so nothing needed deleting.
    NothingCreated,
    /// The resource group was deleted.
    Deleted {
        /// Deleted resource group.
        resource_group: String,
    },
    /// Deleting the resource group failed; resources may remain.
    Failed {
        /// Resource group left behind.
        resource_group: String,
        /// Provider message describing the failure.
        message: String,
    },
}

impl CleanupOutcome {
    /// Returns `true` when cleanup left resources behind.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Suffix appended to a failure message to describe cleanup.
    #[must_use]
    pub fn note(&self) -> String {
        match self {
            Self::NothingCreated => String::new(),
            Self::Deleted { resource_group } => {
                format!(" (resource group {resource_group} deleted)")
            }
            Self::Failed {
                resource_group,
                message,
            } => format!(" (cleanup of resource group {resource_group} also failed: {message})"),
        }
    }
}

/// Failed run: the error that stopped the sequence plus what cleanup did.
#[derive(Debug, Error)]
#[error("{error}{}", .cleanup.note())]
pub struct RunFailure<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Error that aborted the forward sequence.
    #[source]
    pub error: RunError<BackendError>,
    /// Outcome of the cleanup stage that ran afterwards.
    pub cleanup: CleanupOutcome,
    /// States visited during the run, oldest first.
    pub history: Vec<RunState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[rstest]
    #[case(CleanupOutcome::NothingCreated, "boom-step failed: boom")]
    #[case(
        CleanupOutcome::Deleted { resource_group: String::from("rg") },
        "boom-step failed: boom (resource group rg deleted)"
    )]
    #[case(
        CleanupOutcome::Failed { resource_group: String::from("rg"), message: String::from("throttled") },
        "boom-step failed: boom (cleanup of resource group rg also failed: throttled)"
    )]
    fn failure_message_carries_cleanup_note(
        #[case] cleanup: CleanupOutcome,
        #[case] expected: &str,
    ) {
        let failure = RunFailure {
            error: RunError::Provider {
                step: Step::Rebind,
                source: Boom,
            },
            cleanup,
            history: vec![RunState::NotStarted],
        };
        let rendered = failure.to_string().replace("rebind public IP", "boom-step");
        assert_eq!(rendered, expected);
    }

    #[test]
    fn authentication_error_names_the_failure() {
        let err: RunError<Boom> = RunError::Authentication(Boom);
        assert_eq!(err.to_string(), "authentication failed: boom");
    }
}
