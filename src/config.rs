//! Configuration loading via `ortho-config`, plus service principal
//! credentials.

use std::fmt;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::backend::{AllocationMethod, ImageReference};

/// Environment variable holding the service principal application id.
pub const CLIENT_ID_ENV: &str = "CLIENT_ID";
/// Environment variable holding the service principal secret.
pub const CLIENT_SECRET_ENV: &str = "CLIENT_SECRET";
/// Environment variable holding the directory (tenant) id.
pub const TENANT_ID_ENV: &str = "TENANT_ID";
/// Environment variable holding the target subscription id.
pub const SUBSCRIPTION_ID_ENV: &str = "SUBSCRIPTION_ID";
/// Longest accepted `poll_interval_secs`.
pub const MAX_POLL_INTERVAL_SECS: u64 = 600;
/// Longest accepted `operation_timeout_secs`.
pub const MAX_OPERATION_TIMEOUT_SECS: u64 = 86_400;

/// Provisioning defaults derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "PIPSWAP",
    discovery(
        app_name = "pipswap",
        env_var = "PIPSWAP_CONFIG_PATH",
        config_file_name = "pipswap.toml",
        dotfile_name = ".pipswap.toml",
        project_file_name = "pipswap.toml"
    )
)]
pub struct ProvisionConfig {
    /// Region every resource is created in. Defaults to `westus`.
    #[ortho_config(default = "westus".to_owned())]
    pub location: String,
    /// VM size. Defaults to `Standard_B1s` to keep runs cheap.
    #[ortho_config(default = "Standard_B1s".to_owned())]
    pub vm_size: String,
    /// Marketplace image publisher.
    #[ortho_config(default = "Canonical".to_owned())]
    pub image_publisher: String,
    /// Marketplace image offer.
    #[ortho_config(default = "0001-com-ubuntu-server-jammy".to_owned())]
    pub image_offer: String,
    /// Marketplace image SKU.
    #[ortho_config(default = "22_04-lts-gen2".to_owned())]
    pub image_sku: String,
    /// Marketplace image version.
    #[ortho_config(default = "latest".to_owned())]
    pub image_version: String,
    /// Administrator user created on the VM.
    #[ortho_config(default = "pipswapadmin".to_owned())]
    pub admin_username: String,
    /// Administrator password. A random one is generated per run when unset.
    pub admin_password: Option<String>,
    /// Allocation method for both public IP addresses (`Dynamic` or
    /// `Static`).
    #[ortho_config(default = "Dynamic".to_owned())]
    pub allocation_method: String,
    /// Address space of the VM network; the subnet spans all of it.
    #[ortho_config(default = "10.0.0.0/28".to_owned())]
    pub network_address_prefix: String,
    /// Prefix for generated resource names.
    #[ortho_config(default = "pipswap".to_owned())]
    pub name_prefix: String,
    /// Seconds between polls of a long-running operation.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Seconds to wait for a long-running operation before giving up.
    #[ortho_config(default = 900)]
    pub operation_timeout_secs: u64,
    /// Base URL of the Resource Manager API.
    #[ortho_config(default = "https://management.azure.com".to_owned())]
    pub management_endpoint: String,
    /// Base URL of the identity platform used for token requests.
    #[ortho_config(default = "https://login.microsoftonline.com".to_owned())]
    pub authority_host: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ProvisionConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [pipswap] in pipswap.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("pipswap")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies per-invocation overrides on top of the loaded values.
    #[must_use]
    pub fn with_overrides(
        mut self,
        location: Option<String>,
        vm_size: Option<String>,
        allocation_method: Option<String>,
    ) -> Self {
        if let Some(value) = location {
            self.location = value;
        }
        if let Some(value) = vm_size {
            self.vm_size = value;
        }
        if let Some(value) = allocation_method {
            self.allocation_method = value;
        }
        self
    }

    /// Parses the configured allocation method.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the value is neither `Dynamic`
    /// nor `Static`.
    pub fn allocation(&self) -> Result<AllocationMethod, ConfigError> {
        self.allocation_method
            .parse()
            .map_err(|err: crate::backend::BackendError| ConfigError::Invalid(err.to_string()))
    }

    /// Returns the configured boot image.
    #[must_use]
    pub fn image(&self) -> ImageReference {
        ImageReference {
            publisher: self.image_publisher.clone(),
            offer: self.image_offer.clone(),
            sku: self.image_sku.clone(),
            version: self.image_version.clone(),
        }
    }

    /// Interval between polls of a long-running operation.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Maximum time to wait for a long-running operation.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// or [`ConfigError::Invalid`] when a value cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (
                &self.location,
                FieldMetadata::new("Azure region", "PIPSWAP_LOCATION", "location"),
            ),
            (
                &self.vm_size,
                FieldMetadata::new("VM size", "PIPSWAP_VM_SIZE", "vm_size"),
            ),
            (
                &self.image_publisher,
                FieldMetadata::new(
                    "image publisher",
                    "PIPSWAP_IMAGE_PUBLISHER",
                    "image_publisher",
                ),
            ),
            (
                &self.image_offer,
                FieldMetadata::new("image offer", "PIPSWAP_IMAGE_OFFER", "image_offer"),
            ),
            (
                &self.image_sku,
                FieldMetadata::new("image SKU", "PIPSWAP_IMAGE_SKU", "image_sku"),
            ),
            (
                &self.image_version,
                FieldMetadata::new("image version", "PIPSWAP_IMAGE_VERSION", "image_version"),
            ),
            (
                &self.admin_username,
                FieldMetadata::new(
                    "VM administrator name",
                    "PIPSWAP_ADMIN_USERNAME",
                    "admin_username",
                ),
            ),
            (
                &self.network_address_prefix,
                FieldMetadata::new(
                    "network address prefix",
                    "PIPSWAP_NETWORK_ADDRESS_PREFIX",
                    "network_address_prefix",
                ),
            ),
            (
                &self.name_prefix,
                FieldMetadata::new("resource name prefix", "PIPSWAP_NAME_PREFIX", "name_prefix"),
            ),
            (
                &self.management_endpoint,
                FieldMetadata::new(
                    "Resource Manager endpoint",
                    "PIPSWAP_MANAGEMENT_ENDPOINT",
                    "management_endpoint",
                ),
            ),
            (
                &self.authority_host,
                FieldMetadata::new(
                    "identity authority host",
                    "PIPSWAP_AUTHORITY_HOST",
                    "authority_host",
                ),
            ),
        ];
        for (value, metadata) in &required {
            Self::require_field(value, metadata)?;
        }

        if let Some(password) = &self.admin_password {
            Self::require_field(
                password,
                &FieldMetadata::new(
                    "VM administrator password",
                    "PIPSWAP_ADMIN_PASSWORD",
                    "admin_password",
                ),
            )?;
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "poll_interval_secs must be at least 1",
            )));
        }
        if self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_secs must be at most {MAX_POLL_INTERVAL_SECS} (PIPSWAP_POLL_INTERVAL_SECS)"
            )));
        }
        if self.operation_timeout_secs > MAX_OPERATION_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "operation_timeout_secs must be at most {MAX_OPERATION_TIMEOUT_SECS} (PIPSWAP_OPERATION_TIMEOUT_SECS)"
            )));
        }
        if self.operation_timeout_secs < self.poll_interval_secs {
            return Err(ConfigError::Invalid(String::from(
                "operation_timeout_secs must not be shorter than poll_interval_secs",
            )));
        }
        self.allocation()?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Service principal credentials and the subscription they act on.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Directory (tenant) id.
    pub tenant_id: String,
    /// Subscription every resource is created in.
    pub subscription_id: String,
}

impl Credentials {
    /// Builds credentials from optional raw values, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Missing`] naming the environment variable
    /// of the first absent or blank value.
    pub fn new(
        client_id: Option<String>,
        client_secret: Option<String>,
        tenant_id: Option<String>,
        subscription_id: Option<String>,
    ) -> Result<Self, CredentialsError> {
        Ok(Self {
            client_id: Self::require(client_id, CLIENT_ID_ENV)?,
            client_secret: Self::require(client_secret, CLIENT_SECRET_ENV)?,
            tenant_id: Self::require(tenant_id, TENANT_ID_ENV)?,
            subscription_id: Self::require(subscription_id, SUBSCRIPTION_ID_ENV)?,
        })
    }

    fn require(value: Option<String>, env_var: &'static str) -> Result<String, CredentialsError> {
        let trimmed = value.map(|raw| raw.trim().to_owned()).unwrap_or_default();
        if trimmed.is_empty() {
            return Err(CredentialsError::Missing { env_var });
        }
        Ok(trimmed)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

/// Errors raised when credentials cannot be assembled.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CredentialsError {
    /// Raised when a credential value is absent or blank.
    #[error("authentication failed: missing credential, set {env_var}")]
    Missing {
        /// Environment variable that should carry the value.
        env_var: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn valid_config() -> ProvisionConfig {
        crate::test_support::sample_config()
    }

    #[rstest]
    fn validate_accepts_defaults(valid_config: ProvisionConfig) {
        assert_eq!(valid_config.validate(), Ok(()));
    }

    #[rstest]
    fn validate_names_env_var_and_toml_key(valid_config: ProvisionConfig) {
        let cfg = ProvisionConfig {
            location: String::from("  "),
            ..valid_config
        };
        let err = cfg.validate().expect_err("blank location should fail");
        let message = err.to_string();
        assert!(message.contains("PIPSWAP_LOCATION"), "message: {message}");
        assert!(message.contains("pipswap.toml"), "message: {message}");
    }

    #[rstest]
    fn validate_rejects_blank_password_when_set(valid_config: ProvisionConfig) {
        let cfg = ProvisionConfig {
            admin_password: Some(String::new()),
            ..valid_config
        };
        let err = cfg.validate().expect_err("blank password should fail");
        assert!(err.to_string().contains("PIPSWAP_ADMIN_PASSWORD"));
    }

    #[rstest]
    fn validate_rejects_unknown_allocation(valid_config: ProvisionConfig) {
        let cfg = ProvisionConfig {
            allocation_method: String::from("sometimes"),
            ..valid_config
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    fn validate_rejects_zero_poll_interval(valid_config: ProvisionConfig) {
        let cfg = ProvisionConfig {
            poll_interval_secs: 0,
            ..valid_config
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    #[case(MAX_POLL_INTERVAL_SECS + 1, 900, "PIPSWAP_POLL_INTERVAL_SECS")]
    #[case(5, MAX_OPERATION_TIMEOUT_SECS + 1, "PIPSWAP_OPERATION_TIMEOUT_SECS")]
    #[case(5, u64::MAX, "PIPSWAP_OPERATION_TIMEOUT_SECS")]
    fn validate_rejects_unbounded_waits(
        valid_config: ProvisionConfig,
        #[case] poll_interval_secs: u64,
        #[case] operation_timeout_secs: u64,
        #[case] env_var: &str,
    ) {
        let cfg = ProvisionConfig {
            poll_interval_secs,
            operation_timeout_secs,
            ..valid_config
        };
        let err = cfg.validate().expect_err("wait bounds should be enforced");
        assert!(err.to_string().contains(env_var), "message: {err}");
    }

    #[rstest]
    fn overrides_replace_only_given_values(valid_config: ProvisionConfig) {
        let cfg = valid_config.with_overrides(
            Some(String::from("eastus")),
            None,
            Some(String::from("static")),
        );
        assert_eq!(cfg.location, "eastus");
        assert_eq!(cfg.vm_size, "Standard_B1s");
        assert_eq!(cfg.allocation(), Ok(AllocationMethod::Static));
    }

    #[rstest]
    #[case(None, Some("s"), Some("t"), Some("sub"), CLIENT_ID_ENV)]
    #[case(Some("c"), Some(" "), Some("t"), Some("sub"), CLIENT_SECRET_ENV)]
    #[case(Some("c"), Some("s"), None, Some("sub"), TENANT_ID_ENV)]
    #[case(Some("c"), Some("s"), Some("t"), Some(""), SUBSCRIPTION_ID_ENV)]
    fn credentials_name_the_missing_variable(
        #[case] client_id: Option<&str>,
        #[case] client_secret: Option<&str>,
        #[case] tenant_id: Option<&str>,
        #[case] subscription_id: Option<&str>,
        #[case] expected: &'static str,
    ) {
        let err = Credentials::new(
            client_id.map(str::to_owned),
            client_secret.map(str::to_owned),
            tenant_id.map(str::to_owned),
            subscription_id.map(str::to_owned),
        )
        .expect_err("credentials should be rejected");
        assert_eq!(err, CredentialsError::Missing { env_var: expected });
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials::new(
            Some(String::from("client")),
            Some(String::from("hunter2")),
            Some(String::from("tenant")),
            Some(String::from("sub")),
        )
        .expect("credentials should build");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"), "rendered: {rendered}");
        assert!(rendered.contains("client"));
    }
}
