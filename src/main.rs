//! Binary entry point for the pipswap CLI.

#[cfg(any(test, feature = "test-backdoors"))]
use std::env;
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info, warn};

#[cfg(any(test, feature = "test-backdoors"))]
use pipswap::test_support::{FakeCloud, Operation};
use pipswap::{
    AzureBackend, Backend, CleanupOutcome, Credentials, ProvisionConfig, ProvisioningSequencer,
    RunNames, RunPlan, RunReport, logging,
};

mod cli;

use cli::Cli;

/// Selects the in-memory cloud instead of Azure. Only honoured in builds with
/// the `test-backdoors` feature.
#[cfg(any(test, feature = "test-backdoors"))]
const FAKE_CLOUD_ENV: &str = "PIPSWAP_FAKE_CLOUD";

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Credentials(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("provisioning run failed: {0}")]
    Run(String),
    #[error("run completed but cleanup of resource group {resource_group} failed: {message}")]
    Cleanup {
        resource_group: String,
        message: String,
    },
    #[cfg(any(test, feature = "test-backdoors"))]
    #[error("unknown PIPSWAP_FAKE_CLOUD mode '{0}'")]
    FakeMode(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "pipswap failed");
            1
        }
    };

    process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let credentials = Credentials::new(
        cli.client_id,
        cli.client_secret,
        cli.tenant_id,
        cli.subscription_id,
    )
    .map_err(|err| CliError::Credentials(err.to_string()))?;

    let config = ProvisionConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?
        .with_overrides(cli.location, cli.vm_size, cli.allocation);
    let names = RunNames::generate(&config.name_prefix);
    let plan =
        RunPlan::from_config(&config, names).map_err(|err| CliError::Config(err.to_string()))?;
    info!(
        run_id = %plan.names.run_id,
        resource_group = %plan.names.resource_group,
        location = %plan.location,
        allocation = %plan.allocation,
        "starting provisioning run"
    );

    #[cfg(any(test, feature = "test-backdoors"))]
    if let Some(fake) = fake_cloud_from_env()? {
        return drive(&ProvisioningSequencer::new(fake, plan)).await;
    }

    let backend = AzureBackend::new(&config, credentials, &plan.names.run_id)
        .map_err(|err| CliError::Backend(err.to_string()))?;
    drive(&ProvisioningSequencer::new(backend, plan)).await
}

async fn drive<B: Backend>(sequencer: &ProvisioningSequencer<B>) -> Result<(), CliError> {
    let report = sequencer
        .execute()
        .await
        .map_err(|failure| CliError::Run(failure.to_string()))?;
    summarise(&report);
    match report.cleanup {
        CleanupOutcome::Failed {
            resource_group,
            message,
        } => Err(CliError::Cleanup {
            resource_group,
            message,
        }),
        CleanupOutcome::Deleted { .. } | CleanupOutcome::NothingCreated => Ok(()),
    }
}

fn summarise(report: &RunReport) {
    info!(
        first = %report.first_address.name,
        first_fqdn = report.first_address.fqdn.as_deref().unwrap_or("<none>"),
        second = %report.second_address.name,
        second_fqdn = report.second_address.fqdn.as_deref().unwrap_or("<none>"),
        "public IP swap verified"
    );
    if report.cleanup.is_failure() {
        warn!("resources may remain{}", report.cleanup.note());
    } else {
        info!("run complete{}", report.cleanup.note());
    }
}

#[cfg(any(test, feature = "test-backdoors"))]
fn fake_cloud_from_env() -> Result<Option<FakeCloud>, CliError> {
    let Ok(mode) = env::var(FAKE_CLOUD_ENV) else {
        return Ok(None);
    };
    let cloud = FakeCloud::new();
    match mode.as_str() {
        "ok" => {}
        "fail-auth" => cloud.fail_on(Operation::Authenticate),
        "fail-vm" => cloud.fail_on(Operation::CreateVirtualMachine),
        "fail-rebind" => cloud.fail_on(Operation::UpdatePrimaryPublicIp),
        "fail-cleanup" => cloud.fail_on(Operation::DeleteResourceGroup),
        other => return Err(CliError::FakeMode(other.to_owned())),
    }
    Ok(Some(cloud))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipswap::test_support::EnvGuard;

    fn cli_with_credentials() -> Cli {
        Cli {
            client_id: Some(String::from("client-1")),
            client_secret: Some(String::from("secret-1")),
            tenant_id: Some(String::from("tenant-1")),
            subscription_id: Some(String::from("sub-1")),
            location: None,
            vm_size: None,
            allocation: None,
            verbose: 0,
        }
    }

    #[tokio::test]
    async fn missing_secret_fails_before_any_call() {
        let cli = Cli {
            client_secret: None,
            ..cli_with_credentials()
        };
        let err = run(cli).await.expect_err("missing secret");
        assert!(
            matches!(err, CliError::Credentials(ref message) if message.contains("CLIENT_SECRET")),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn fake_cloud_run_succeeds() {
        let _guard = EnvGuard::set_vars(&[(FAKE_CLOUD_ENV, Some("ok"))]).await;
        run(cli_with_credentials()).await.expect("fake run");
    }

    #[tokio::test]
    async fn cleanup_failure_after_success_is_reported() {
        let _guard = EnvGuard::set_vars(&[(FAKE_CLOUD_ENV, Some("fail-cleanup"))]).await;
        let err = run(cli_with_credentials()).await.expect_err("cleanup failed");
        assert!(matches!(err, CliError::Cleanup { .. }), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn rejected_allocation_override_is_a_config_error() {
        let _guard = EnvGuard::set_vars(&[(FAKE_CLOUD_ENV, Some("ok"))]).await;
        let cli = Cli {
            allocation: Some(String::from("sometimes")),
            ..cli_with_credentials()
        };
        let err = run(cli).await.expect_err("bad allocation");
        assert!(matches!(err, CliError::Config(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn unknown_fake_mode_is_rejected() {
        let _guard = EnvGuard::set_vars(&[(FAKE_CLOUD_ENV, Some("sideways"))]).await;
        let err = run(cli_with_credentials()).await.expect_err("bad mode");
        assert!(matches!(err, CliError::FakeMode(_)), "unexpected error: {err}");
    }
}
