//! Unique resource names for a single provisioning run.
//!
//! Every name carries a random suffix so concurrent runs in the same
//! subscription never collide. DNS labels are derived from the address
//! names and satisfy the regional label rules (lowercase, starts with a
//! letter, at most 63 characters).

use uuid::Uuid;

/// Length of the random hexadecimal suffix appended to each name.
const SUFFIX_LEN: usize = 8;

/// Longest DNS label the provider accepts.
pub const MAX_DNS_LABEL_LEN: usize = 63;

/// Longest resource-group name accepted here; the provider allows 90.
const MAX_GROUP_NAME_LEN: usize = 64;

/// Names used by one run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunNames {
    /// Random suffix shared by the run's tags.
    pub run_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// First public IP address name.
    pub first_address: String,
    /// DNS label of the first address.
    pub first_dns_label: String,
    /// Second public IP address name.
    pub second_address: String,
    /// DNS label of the second address.
    pub second_dns_label: String,
    /// VM name.
    pub vm: String,
    /// Virtual network name.
    pub network: String,
}

impl RunNames {
    /// Generates a fresh set of names using `prefix` for the resource group.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        let run_id = random_suffix();
        let first_address = format!("pip1-{}", random_suffix());
        let second_address = format!("pip2-{}", random_suffix());
        let vm = format!("vm{}", random_suffix());
        Self {
            resource_group: group_name(prefix, &run_id),
            first_dns_label: dns_label(&first_address),
            second_dns_label: dns_label(&second_address),
            network: format!("{vm}-vnet"),
            run_id,
            first_address,
            second_address,
            vm,
        }
    }
}

/// Builds the DNS label for an address name.
#[must_use]
pub fn dns_label(address_name: &str) -> String {
    let mut label: String = format!("dns-{address_name}")
        .chars()
        .map(|ch| ch.to_ascii_lowercase())
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
        .take(MAX_DNS_LABEL_LEN)
        .collect();
    while label.ends_with('-') {
        label.pop();
    }
    label
}

fn group_name(prefix: &str, run_id: &str) -> String {
    let cleaned: String = prefix
        .trim()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
        .collect();
    let room = MAX_GROUP_NAME_LEN.saturating_sub(run_id.len() + "-rg-".len());
    let head: String = cleaned.chars().take(room).collect();
    if head.is_empty() {
        format!("rg-{run_id}")
    } else {
        format!("{head}-rg-{run_id}")
    }
}

fn random_suffix() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SUFFIX_LEN)
        .collect()
}
