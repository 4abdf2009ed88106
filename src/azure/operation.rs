//! Long-running operation tracking.
//!
//! Writes and deletes may be accepted before they finish. The provider then
//! hands out either an `Azure-AsyncOperation` link, whose body carries a
//! `status`, or a `Location` link that answers `202` until the operation is
//! done. Both are polled until a terminal state or the wait timeout.

use std::time::Instant;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LOCATION};
use tokio::time::sleep;
use tracing::debug;

use super::client::{ArmClient, decode};
use super::error::AzureBackendError;
use super::models::{
    NetworkInterface, OperationStatusBody, PublicIpResource, ResourceGroup, VirtualMachine,
    VirtualNetwork,
};

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Link to poll for the outcome of an accepted request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum PendingOperation {
    /// `Azure-AsyncOperation` status link.
    AsyncOperation(String),
    /// `Location` link.
    Location(String),
}

impl PendingOperation {
    /// Prefers the `Azure-AsyncOperation` header over `Location`.
    pub(super) fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
                .filter(|value| !value.trim().is_empty())
        };
        header(ASYNC_OPERATION_HEADER)
            .map(Self::AsyncOperation)
            .or_else(|| header(LOCATION.as_str()).map(Self::Location))
    }

    fn url(&self) -> &str {
        match self {
            Self::AsyncOperation(url) | Self::Location(url) => url,
        }
    }
}

/// State of a polled operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum OperationStatus {
    /// Still running.
    InProgress,
    /// Finished successfully.
    Succeeded,
    /// Finished unsuccessfully with the given status and message.
    Failed {
        /// Terminal status (`Failed` or `Canceled`).
        status: String,
        /// Provider message.
        message: String,
    },
}

impl OperationStatus {
    fn from_body(body: OperationStatusBody) -> Self {
        if body.status == "Succeeded" {
            return Self::Succeeded;
        }
        if !matches!(body.status.as_str(), "Failed" | "Canceled") {
            return Self::InProgress;
        }
        Self::Failed {
            message: body
                .error
                .map(|detail| detail.message)
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| String::from("no error details")),
            status: body.status,
        }
    }
}

/// `provisioningState` of a resource, folded into three outcomes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum ProvisioningStatus {
    /// `Succeeded`, or no state reported.
    Succeeded,
    /// `Failed` or `Canceled`.
    Failed(String),
    /// Anything else (`Creating`, `Updating`, `Deleting`, ...).
    InProgress,
}

impl ProvisioningStatus {
    pub(super) fn of(state: Option<&str>) -> Self {
        match state {
            None | Some("Succeeded") => Self::Succeeded,
            Some(failed @ ("Failed" | "Canceled")) => Self::Failed(failed.to_owned()),
            Some(_) => Self::InProgress,
        }
    }
}

/// Resources that report a `provisioningState`.
pub(super) trait Provisioned {
    fn provisioning_state(&self) -> Option<&str>;
}

impl Provisioned for ResourceGroup {
    fn provisioning_state(&self) -> Option<&str> {
        self.properties
            .as_ref()
            .and_then(|props| props.provisioning_state.as_deref())
    }
}

impl Provisioned for PublicIpResource {
    fn provisioning_state(&self) -> Option<&str> {
        self.properties.provisioning_state.as_deref()
    }
}

impl Provisioned for VirtualNetwork {
    fn provisioning_state(&self) -> Option<&str> {
        self.properties.provisioning_state.as_deref()
    }
}

impl Provisioned for NetworkInterface {
    fn provisioning_state(&self) -> Option<&str> {
        self.properties.provisioning_state.as_deref()
    }
}

impl Provisioned for VirtualMachine {
    fn provisioning_state(&self) -> Option<&str> {
        self.properties.provisioning_state.as_deref()
    }
}

impl ArmClient {
    /// Polls `operation` until it reaches a terminal state or `deadline`
    /// passes.
    pub(super) async fn wait_until_done(
        &self,
        operation: &PendingOperation,
        deadline: Instant,
        action: &str,
        resource: &str,
    ) -> Result<(), AzureBackendError> {
        while Instant::now() <= deadline {
            match self.poll(operation).await? {
                OperationStatus::Succeeded => return Ok(()),
                OperationStatus::Failed { status, message } => {
                    return Err(AzureBackendError::OperationFailed {
                        operation: action.to_owned(),
                        status,
                        message,
                    });
                }
                OperationStatus::InProgress => {
                    debug!(action, resource, "operation still running");
                    sleep(self.poll_interval).await;
                }
            }
        }

        Err(AzureBackendError::Timeout {
            action: action.to_owned(),
            resource: resource.to_owned(),
        })
    }

    async fn poll(&self, operation: &PendingOperation) -> Result<OperationStatus, AzureBackendError> {
        let response = self.get_url(operation.url()).await?;
        match operation {
            PendingOperation::AsyncOperation(url) => {
                let body: OperationStatusBody = decode(url, &response.body)?;
                Ok(OperationStatus::from_body(body))
            }
            PendingOperation::Location(_) if response.status == StatusCode::ACCEPTED => {
                Ok(OperationStatus::InProgress)
            }
            PendingOperation::Location(_) => Ok(OperationStatus::Succeeded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    #[test]
    fn async_operation_header_wins_over_location() {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("https://arm/location"));
        headers.insert(
            ASYNC_OPERATION_HEADER,
            HeaderValue::from_static("https://arm/status"),
        );
        assert_eq!(
            PendingOperation::from_headers(&headers),
            Some(PendingOperation::AsyncOperation(String::from(
                "https://arm/status"
            )))
        );
    }

    #[test]
    fn no_headers_means_nothing_pending() {
        assert_eq!(PendingOperation::from_headers(&HeaderMap::new()), None);
    }

    #[rstest]
    #[case(None, ProvisioningStatus::Succeeded)]
    #[case(Some("Succeeded"), ProvisioningStatus::Succeeded)]
    #[case(Some("Updating"), ProvisioningStatus::InProgress)]
    #[case(Some("Canceled"), ProvisioningStatus::Failed(String::from("Canceled")))]
    fn provisioning_states_fold(#[case] state: Option<&str>, #[case] expected: ProvisioningStatus) {
        assert_eq!(ProvisioningStatus::of(state), expected);
    }

    #[test]
    fn failed_operation_carries_provider_message() {
        let body: OperationStatusBody = serde_json::from_str(
            r#"{"status":"Failed","error":{"code":"QuotaExceeded","message":"no cores left"}}"#,
        )
        .expect("decode");
        assert_eq!(
            OperationStatus::from_body(body),
            OperationStatus::Failed {
                status: String::from("Failed"),
                message: String::from("no cores left"),
            }
        );
    }
}
