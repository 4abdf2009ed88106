//! Everything a run needs to know before it issues the first remote call.

use uuid::Uuid;

use crate::backend::{
    AllocationMethod, ImageReference, NetworkSpec, PublicIpRequest, VirtualMachineRequest,
    VmCredentials,
};
use crate::config::{ConfigError, ProvisionConfig};
use crate::names::RunNames;

/// Subnet created inside the run's virtual network.
pub const SUBNET_NAME: &str = "default";

/// Resolved inputs for one provisioning run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunPlan {
    /// Generated resource names.
    pub names: RunNames,
    /// Region every resource is created in.
    pub location: String,
    /// Allocation method used for both public IPs.
    pub allocation: AllocationMethod,
    /// Address space of the virtual network.
    pub network_address_prefix: String,
    /// Boot image.
    pub image: ImageReference,
    /// Administrator login.
    pub credentials: VmCredentials,
    /// VM size.
    pub vm_size: String,
}

impl RunPlan {
    /// Builds a plan from validated configuration and freshly generated names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration fails validation.
    pub fn from_config(config: &ProvisionConfig, names: RunNames) -> Result<Self, ConfigError> {
        config.validate()?;
        let admin_password = config
            .admin_password
            .clone()
            .unwrap_or_else(generate_admin_password);
        Ok(Self {
            names,
            location: config.location.clone(),
            allocation: config.allocation()?,
            network_address_prefix: config.network_address_prefix.clone(),
            image: config.image(),
            credentials: VmCredentials {
                admin_username: config.admin_username.clone(),
                admin_password,
            },
            vm_size: config.vm_size.clone(),
        })
    }

    /// Request for the address the VM is created with.
    #[must_use]
    pub fn first_address_request(&self) -> PublicIpRequest {
        self.address_request(&self.names.first_address, &self.names.first_dns_label)
    }

    /// Request for the address the VM is moved to.
    #[must_use]
    pub fn second_address_request(&self) -> PublicIpRequest {
        self.address_request(&self.names.second_address, &self.names.second_dns_label)
    }

    /// Request for the VM, bound to the public IP identified by `public_ip_id`.
    #[must_use]
    pub fn vm_request(&self, public_ip_id: &str) -> VirtualMachineRequest {
        VirtualMachineRequest {
            name: self.names.vm.clone(),
            resource_group: self.names.resource_group.clone(),
            location: self.location.clone(),
            network: NetworkSpec {
                name: self.names.network.clone(),
                address_prefix: self.network_address_prefix.clone(),
                subnet_name: SUBNET_NAME.to_owned(),
                subnet_prefix: self.network_address_prefix.clone(),
            },
            public_ip_id: public_ip_id.to_owned(),
            image: self.image.clone(),
            credentials: self.credentials.clone(),
            size: self.vm_size.clone(),
        }
    }

    fn address_request(&self, name: &str, dns_label: &str) -> PublicIpRequest {
        PublicIpRequest {
            name: name.to_owned(),
            resource_group: self.names.resource_group.clone(),
            location: self.location.clone(),
            allocation: self.allocation,
            dns_label: Some(dns_label.to_owned()),
        }
    }
}

/// Password meeting the provider's complexity rules: upper, lower, digit and
/// symbol, 12 to 123 characters.
fn generate_admin_password() -> String {
    format!("Pw{}!9", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_config, sample_names};
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> ProvisionConfig {
        ProvisionConfig {
            allocation_method: String::from("Static"),
            ..sample_config()
        }
    }

    #[rstest]
    fn plan_carries_names_into_requests(config: ProvisionConfig) {
        let plan = RunPlan::from_config(&config, sample_names()).expect("plan should build");
        let first = plan.first_address_request();
        assert_eq!(first.name, "pip1-abc");
        assert_eq!(first.dns_label.as_deref(), Some("dns-pip1-abc"));
        assert_eq!(first.resource_group, "rg-test1");
        assert_eq!(first.allocation, AllocationMethod::Static);
        let second = plan.second_address_request();
        assert_eq!(second.dns_label.as_deref(), Some("dns-pip2-def"));

        let vm = plan.vm_request("/ip/1");
        assert_eq!(vm.name, "vmXYZ");
        assert_eq!(vm.public_ip_id, "/ip/1");
        assert_eq!(vm.network.subnet_name, SUBNET_NAME);
        assert_eq!(vm.validate(), Ok(()));
    }

    #[rstest]
    fn generated_password_meets_complexity_rules(config: ProvisionConfig) {
        let plan = RunPlan::from_config(&config, sample_names()).expect("plan should build");
        let password = &plan.credentials.admin_password;
        assert!((12..=123).contains(&password.len()));
        assert!(password.chars().any(|ch| ch.is_ascii_uppercase()));
        assert!(password.chars().any(|ch| ch.is_ascii_lowercase()));
        assert!(password.chars().any(|ch| ch.is_ascii_digit()));
        assert!(password.chars().any(|ch| !ch.is_ascii_alphanumeric()));
    }

    #[rstest]
    fn configured_password_is_used(config: ProvisionConfig) {
        let cfg = ProvisionConfig {
            admin_password: Some(String::from("Configured-Pass1")),
            ..config
        };
        let plan = RunPlan::from_config(&cfg, sample_names()).expect("plan should build");
        assert_eq!(plan.credentials.admin_password, "Configured-Pass1");
    }

    #[rstest]
    fn invalid_config_is_rejected(config: ProvisionConfig) {
        let cfg = ProvisionConfig {
            vm_size: String::new(),
            ..config
        };
        assert!(matches!(
            RunPlan::from_config(&cfg, sample_names()),
            Err(ConfigError::MissingField(_))
        ));
    }
}
