//! Thin Resource Manager client over `reqwest`.

use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::debug;

use super::auth::TokenSource;
use super::error::AzureBackendError;
use super::models::ArmErrorEnvelope;
use super::operation::{PendingOperation, Provisioned, ProvisioningStatus};

/// Response of a Resource Manager call that succeeded.
pub(super) struct ArmResponse {
    pub(super) status: StatusCode,
    pub(super) pending: Option<PendingOperation>,
    pub(super) body: String,
}

/// Issues authenticated calls against one subscription.
pub(super) struct ArmClient {
    http: reqwest::Client,
    base: String,
    auth: TokenSource,
    pub(super) poll_interval: Duration,
    pub(super) wait_timeout: Duration,
}

impl ArmClient {
    pub(super) fn new(
        http: reqwest::Client,
        management_endpoint: &str,
        auth: TokenSource,
        poll_interval: Duration,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base: management_endpoint.trim_end_matches('/').to_owned(),
            auth,
            poll_interval,
            wait_timeout,
        }
    }

    /// `/subscriptions/{id}` prefix shared by every resource path.
    pub(super) fn subscription_path(&self) -> String {
        format!("/subscriptions/{}", self.auth.subscription_id())
    }

    pub(super) async fn authenticate(&self) -> Result<(), AzureBackendError> {
        self.auth.token().await.map(|_| ())
    }

    pub(super) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<T, AzureBackendError> {
        let response = self
            .send(Method::GET, &self.url(path), Some(api_version), None::<&()>)
            .await?;
        decode(path, &response.body)
    }

    pub(super) async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        api_version: &str,
        body: &B,
    ) -> Result<ArmResponse, AzureBackendError> {
        self.send(Method::PUT, &self.url(path), Some(api_version), Some(body))
            .await
    }

    pub(super) async fn delete(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<ArmResponse, AzureBackendError> {
        self.send(Method::DELETE, &self.url(path), Some(api_version), None::<&()>)
            .await
    }

    /// GETs an absolute URL handed out by the provider, such as an operation
    /// status link.
    pub(super) async fn get_url(&self, url: &str) -> Result<ArmResponse, AzureBackendError> {
        self.send(Method::GET, url, None, None::<&()>).await
    }

    /// Writes a resource, waits for the write to finish and returns the
    /// resource as the provider now reports it.
    pub(super) async fn put_and_wait<B, T>(
        &self,
        path: &str,
        api_version: &str,
        body: &B,
        action: &str,
    ) -> Result<T, AzureBackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Provisioned,
    {
        let deadline = self.deadline(action)?;
        let response = self.put(path, api_version, body).await?;
        debug!(path, status = response.status.as_u16(), "PUT accepted");
        if let Some(operation) = &response.pending {
            self.wait_until_done(operation, deadline, action, path)
                .await?;
        }
        self.wait_for_provisioning(path, api_version, deadline, action)
            .await
    }

    /// Deletes a resource and waits for the deletion to finish.
    pub(super) async fn delete_and_wait(
        &self,
        path: &str,
        api_version: &str,
        action: &str,
    ) -> Result<(), AzureBackendError> {
        let deadline = self.deadline(action)?;
        let response = self.delete(path, api_version).await?;
        debug!(path, status = response.status.as_u16(), "DELETE accepted");
        match &response.pending {
            Some(operation) => {
                self.wait_until_done(operation, deadline, action, path)
                    .await
            }
            None => Ok(()),
        }
    }

    /// Instant by which an operation started now must finish.
    ///
    /// Computed before the request is sent, so an unusable timeout fails
    /// without creating anything.
    fn deadline(&self, action: &str) -> Result<Instant, AzureBackendError> {
        Instant::now().checked_add(self.wait_timeout).ok_or_else(|| {
            AzureBackendError::Config(format!(
                "operation timeout of {}s for {action} is out of range",
                self.wait_timeout.as_secs()
            ))
        })
    }

    async fn wait_for_provisioning<T>(
        &self,
        path: &str,
        api_version: &str,
        deadline: Instant,
        action: &str,
    ) -> Result<T, AzureBackendError>
    where
        T: DeserializeOwned + Provisioned,
    {
        while Instant::now() <= deadline {
            let resource: T = self.get(path, api_version).await?;
            match ProvisioningStatus::of(resource.provisioning_state()) {
                ProvisioningStatus::Succeeded => return Ok(resource),
                ProvisioningStatus::Failed(state) => {
                    let message = format!("{path} reports provisioning state {state}");
                    return Err(AzureBackendError::OperationFailed {
                        operation: action.to_owned(),
                        status: state,
                        message,
                    });
                }
                ProvisioningStatus::InProgress => sleep(self.poll_interval).await,
            }
        }
        Err(AzureBackendError::Timeout {
            action: action.to_owned(),
            resource: path.to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        api_version: Option<&str>,
        body: Option<&B>,
    ) -> Result<ArmResponse, AzureBackendError> {
        let token = self.auth.token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(version) = api_version {
            request = request.query(&[("api-version", version)]);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = request.send().await?;
        let status = response.status();
        let pending = PendingOperation::from_headers(response.headers());
        let text = response.text().await?;
        if !status.is_success() {
            return Err(provider_error(status, &text));
        }
        Ok(ArmResponse {
            status,
            pending,
            body: text,
        })
    }
}

fn provider_error(status: StatusCode, body: &str) -> AzureBackendError {
    let (code, message) = serde_json::from_str::<ArmErrorEnvelope>(body).map_or_else(
        |_| (String::new(), fallback_message(status, body)),
        |envelope| (envelope.error.code, envelope.error.message),
    );
    AzureBackendError::Provider {
        status: Some(status.as_u16()),
        code,
        message,
    }
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned()
    } else {
        trimmed.to_owned()
    }
}

pub(super) fn decode<T: DeserializeOwned>(resource: &str, body: &str) -> Result<T, AzureBackendError> {
    serde_json::from_str(body).map_err(|err| AzureBackendError::MalformedResponse {
        resource: resource.to_owned(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_error_envelope_is_decoded() {
        let err = provider_error(
            StatusCode::CONFLICT,
            r#"{"error":{"code":"InUsePublicIpAddressCannotBeDeleted","message":"in use"}}"#,
        );
        assert_eq!(
            err,
            AzureBackendError::Provider {
                status: Some(409),
                code: String::from("InUsePublicIpAddressCannotBeDeleted"),
                message: String::from("in use"),
            }
        );
    }

    #[test]
    fn empty_error_body_uses_reason_phrase() {
        let err = provider_error(StatusCode::NOT_FOUND, "");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Not Found"), "{err}");
    }
}
