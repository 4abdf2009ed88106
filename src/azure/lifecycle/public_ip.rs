//! Public IP address resources.

use crate::backend::{AllocationMethod, PublicIpAddress, PublicIpRequest};

use super::super::AzureBackend;
use super::super::error::AzureBackendError;
use super::super::models::{DnsSettings, PublicIpProperties, PublicIpResource};
use super::NETWORK_API_VERSION;

const PUBLIC_IP_KIND: &str = "publicIPAddresses";

impl AzureBackend {
    pub(in crate::azure) async fn create_address(
        &self,
        request: &PublicIpRequest,
    ) -> Result<PublicIpAddress, AzureBackendError> {
        let path = self.network_path(&request.resource_group, PUBLIC_IP_KIND, &request.name);
        let body = PublicIpResource {
            location: request.location.clone(),
            tags: self.tags.clone(),
            properties: PublicIpProperties {
                allocation_method: request.allocation.as_str().to_owned(),
                dns_settings: request.dns_label.as_ref().map(|label| DnsSettings {
                    domain_name_label: Some(label.clone()),
                    fqdn: None,
                }),
                ..PublicIpProperties::default()
            },
            ..PublicIpResource::default()
        };
        let resource: PublicIpResource = self
            .arm
            .put_and_wait(&path, NETWORK_API_VERSION, &body, "create public IP")
            .await?;
        to_address(resource, &path)
    }

    pub(in crate::azure) async fn read_address(
        &self,
        id: &str,
    ) -> Result<PublicIpAddress, AzureBackendError> {
        let resource: PublicIpResource = self.arm.get(id, NETWORK_API_VERSION).await?;
        to_address(resource, id)
    }

    pub(in crate::azure) async fn delete_address(&self, id: &str) -> Result<(), AzureBackendError> {
        self.arm
            .delete_and_wait(id, NETWORK_API_VERSION, "delete public IP")
            .await
    }
}

fn to_address(resource: PublicIpResource, path: &str) -> Result<PublicIpAddress, AzureBackendError> {
    let allocation: AllocationMethod = resource
        .properties
        .allocation_method
        .parse()
        .map_err(|err: crate::backend::BackendError| AzureBackendError::MalformedResponse {
            resource: path.to_owned(),
            message: err.to_string(),
        })?;
    let (dns_label, fqdn) = resource
        .properties
        .dns_settings
        .map_or((None, None), |dns| (dns.domain_name_label, dns.fqdn));
    Ok(PublicIpAddress {
        id: if resource.id.is_empty() {
            path.to_owned()
        } else {
            resource.id
        },
        name: resource.name,
        ip_address: resource.properties.ip_address,
        allocation,
        dns_label,
        fqdn,
    })
}
