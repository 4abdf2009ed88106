//! Error types for the Azure backend.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;

/// Errors raised by the Azure backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AzureBackendError {
    /// Raised when the high-level configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request is missing a required field.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Raised when the identity platform refuses to issue a token.
    #[error("token request for tenant {tenant_id} failed: {message}")]
    Authentication {
        /// Tenant the token was requested for.
        tenant_id: String,
        /// Error description returned by the identity platform.
        message: String,
    },
    /// Wrapper for Resource Manager error responses and transport failures.
    #[error("provider error{}: {message}", format_code(.status.as_ref(), .code))]
    Provider {
        /// HTTP status, absent for transport failures.
        status: Option<u16>,
        /// Error code from the response envelope.
        code: String,
        /// Error message from the response envelope.
        message: String,
    },
    /// Raised when a long-running operation ends in `Failed` or `Canceled`.
    #[error("{operation} ended with status {status}: {message}")]
    OperationFailed {
        /// Operation being waited on.
        operation: String,
        /// Terminal status reported by the provider.
        status: String,
        /// Error message reported with the status.
        message: String,
    },
    /// Raised when a long-running operation exceeds the timeout.
    #[error("timeout waiting for {action} on {resource}")]
    Timeout {
        /// Action being waited on.
        action: String,
        /// Resource the action targets.
        resource: String,
    },
    /// Raised when a response body does not have the expected shape.
    #[error("unexpected response for {resource}: {message}")]
    MalformedResponse {
        /// Resource the response describes.
        resource: String,
        /// What was wrong with it.
        message: String,
    },
    /// Raised when a VM reports no network interface.
    #[error("virtual machine {vm} has no network interface")]
    MissingPrimaryNic {
        /// VM name.
        vm: String,
    },
    /// Raised when an interface has no IP configuration to update.
    #[error("network interface {nic} has no IP configuration")]
    MissingIpConfiguration {
        /// Interface name or id.
        nic: String,
    },
}

fn format_code(status: Option<&u16>, code: &str) -> String {
    match (status, code.is_empty()) {
        (Some(status), false) => format!(" ({status} {code})"),
        (Some(status), true) => format!(" ({status})"),
        (None, false) => format!(" ({code})"),
        (None, true) => String::new(),
    }
}

impl AzureBackendError {
    /// Returns `true` when the provider reported that a resource does not
    /// exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Provider { status, code, .. } => {
                *status == Some(404) || matches!(code.as_str(), "ResourceGroupNotFound" | "ResourceNotFound")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AzureBackendError {
    fn from(value: reqwest::Error) -> Self {
        Self::Provider {
            status: value.status().map(|status| status.as_u16()),
            code: String::new(),
            message: value.to_string(),
        }
    }
}

impl From<BackendError> for AzureBackendError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Validation(field) => Self::Validation(field),
            BackendError::UnknownAllocationMethod(_) => Self::Validation(value.to_string()),
        }
    }
}

impl From<ConfigError> for AzureBackendError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(404), "Whatever", true)]
    #[case(None, "ResourceGroupNotFound", true)]
    #[case(Some(409), "Conflict", false)]
    fn not_found_is_detected(#[case] status: Option<u16>, #[case] code: &str, #[case] expected: bool) {
        let err = AzureBackendError::Provider {
            status,
            code: code.to_owned(),
            message: String::from("m"),
        };
        assert_eq!(err.is_not_found(), expected);
    }

    #[test]
    fn provider_message_includes_status_and_code() {
        let err = AzureBackendError::Provider {
            status: Some(409),
            code: String::from("InUsePublicIpAddressCannotBeDeleted"),
            message: String::from("still in use"),
        };
        assert_eq!(
            err.to_string(),
            "provider error (409 InUsePublicIpAddressCannotBeDeleted): still in use"
        );
    }
}
