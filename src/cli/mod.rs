//! Command-line interface definitions for the `pipswap` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `pipswap` binary.
///
/// Running without arguments performs one complete provisioning run.
/// Service principal credentials are read from the environment.
#[derive(Debug, Parser)]
#[command(
    name = "pipswap",
    version,
    about = "Create a VM, move it between two public IP addresses, detach it, and clean up"
)]
pub(crate) struct Cli {
    /// Service principal application id.
    #[arg(long, env = "CLIENT_ID", hide = true, hide_env_values = true)]
    pub(crate) client_id: Option<String>,
    /// Service principal secret.
    #[arg(long, env = "CLIENT_SECRET", hide = true, hide_env_values = true)]
    pub(crate) client_secret: Option<String>,
    /// Directory (tenant) id.
    #[arg(long, env = "TENANT_ID", hide = true, hide_env_values = true)]
    pub(crate) tenant_id: Option<String>,
    /// Subscription to create resources in.
    #[arg(long, env = "SUBSCRIPTION_ID", hide = true, hide_env_values = true)]
    pub(crate) subscription_id: Option<String>,
    /// Override the region for this run.
    #[arg(long, value_name = "REGION")]
    pub(crate) location: Option<String>,
    /// Override the VM size for this run.
    #[arg(long, value_name = "SIZE")]
    pub(crate) vm_size: Option<String>,
    /// Allocation method for both public IP addresses (dynamic or static).
    #[arg(long, value_name = "METHOD")]
    pub(crate) allocation: Option<String>,
    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,
}
