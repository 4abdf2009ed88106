//! Client-credentials token acquisition with a small expiry-aware cache.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Credentials;

use super::error::AzureBackendError;
use super::models::{TokenErrorResponse, TokenResponse};

/// Tokens are renewed this long before the identity platform says they
/// expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Lifetime assumed when the response omits `expires_in`.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct AccessToken {
    secret: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

/// Issues bearer tokens for Resource Manager calls.
pub(super) struct TokenSource {
    http: reqwest::Client,
    credentials: Credentials,
    token_url: String,
    scope: String,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub(super) fn new(
        http: reqwest::Client,
        credentials: Credentials,
        authority_host: &str,
        management_endpoint: &str,
    ) -> Self {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.trim_end_matches('/'),
            credentials.tenant_id
        );
        let scope = format!("{}/.default", management_endpoint.trim_end_matches('/'));
        Self {
            http,
            credentials,
            token_url,
            scope,
            cached: Mutex::new(None),
        }
    }

    pub(super) fn subscription_id(&self) -> &str {
        &self.credentials.subscription_id
    }

    /// Returns a valid bearer token, requesting a new one when the cached
    /// token is missing or about to expire.
    pub(super) async fn token(&self) -> Result<String, AzureBackendError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.secret.clone());
        }
        let fresh = self.request_token().await?;
        let secret = fresh.secret.clone();
        *cached = Some(fresh);
        Ok(secret)
    }

    async fn request_token(&self) -> Result<AccessToken, AzureBackendError> {
        debug!(tenant_id = %self.credentials.tenant_id, "requesting access token");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|err| self.auth_error(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            let message = parsed
                .error_description
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| format!("HTTP {status} {}", parsed.error));
            return Err(self.auth_error(message));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| self.auth_error(format!("unreadable token response: {err}")))?;
        Ok(AccessToken {
            secret: token.access_token,
            expires_at: expiry(Instant::now(), token.expires_in),
        })
    }

    fn auth_error(&self, message: String) -> AzureBackendError {
        AzureBackendError::Authentication {
            tenant_id: self.credentials.tenant_id.clone(),
            message,
        }
    }
}

/// Expiry of a token issued at `now`. Lifetimes that cannot be represented
/// fall back to [`DEFAULT_LIFETIME`].
fn expiry(now: Instant, expires_in: Option<u64>) -> Instant {
    expires_in
        .map(Duration::from_secs)
        .and_then(|lifetime| now.checked_add(lifetime))
        .or_else(|| now.checked_add(DEFAULT_LIFETIME))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_close_to_expiry_are_stale() {
        let stale = AccessToken {
            secret: String::from("t"),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        let fresh = AccessToken {
            secret: String::from("t"),
            expires_at: Instant::now() + Duration::from_secs(3600),
        };
        assert!(!stale.is_fresh());
        assert!(fresh.is_fresh());
    }

    #[test]
    fn unrepresentable_lifetime_falls_back_to_default() {
        let now = Instant::now();
        assert_eq!(expiry(now, Some(u64::MAX)), now + DEFAULT_LIFETIME);
        assert_eq!(expiry(now, None), now + DEFAULT_LIFETIME);
        assert_eq!(expiry(now, Some(3600)), now + Duration::from_secs(3600));
    }
}
