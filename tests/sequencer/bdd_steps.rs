//! BDD step definitions for the provisioning sequencer.

use pipswap::test_support::{Call, Operation};
use pipswap::{Backend, ProvisioningSequencer};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{DeleteOutcome, RunOutcome, SequencerContext, SequencerTestError};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] SequencerTestError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a sequencer for resource group \"{name}\"")]
fn sequencer_for_group(mut sequencer_context: SequencerContext, name: String) -> SequencerContext {
    sequencer_context.plan.names.resource_group = name;
    sequencer_context
}

#[given("the \"{operation}\" operation fails")]
fn operation_fails(
    sequencer_context: SequencerContext,
    operation: String,
) -> Result<SequencerContext, StepError> {
    sequencer_context.cloud.fail_on(parse_operation(&operation)?);
    Ok(sequencer_context)
}

#[given("the provider ignores rebinds")]
fn provider_ignores_rebinds(sequencer_context: SequencerContext) -> SequencerContext {
    sequencer_context.cloud.ignore_rebinds();
    sequencer_context
}

#[when("the provisioning run executes")]
fn run_executes(sequencer_context: SequencerContext) -> Result<SequencerContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let sequencer =
        ProvisioningSequencer::new(sequencer_context.cloud.clone(), sequencer_context.plan.clone());
    let outcome = match runtime.block_on(sequencer.execute()) {
        Ok(report) => RunOutcome::Success(Box::new(report)),
        Err(failure) => RunOutcome::Failure(failure.to_string()),
    };
    Ok(SequencerContext {
        outcome: Some(outcome),
        ..sequencer_context
    })
}

#[when("the resource group \"{name}\" is deleted again")]
fn group_deleted_again(
    sequencer_context: SequencerContext,
    name: String,
) -> Result<SequencerContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let cloud = sequencer_context.cloud.clone();
    let outcome = match runtime.block_on(async move { cloud.delete_resource_group(&name).await }) {
        Ok(()) => DeleteOutcome::Succeeded,
        Err(err) => DeleteOutcome::Failed(err.to_string()),
    };
    Ok(SequencerContext {
        repeat_delete: Some(outcome),
        ..sequencer_context
    })
}

#[then("the run succeeds")]
fn run_succeeds(sequencer_context: &SequencerContext) -> Result<(), StepError> {
    match &sequencer_context.outcome {
        Some(RunOutcome::Success(_)) => Ok(()),
        Some(RunOutcome::Failure(message)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the run fails with \"{text}\"")]
fn run_fails_with(sequencer_context: &SequencerContext, text: String) -> Result<(), StepError> {
    let Some(RunOutcome::Failure(message)) = &sequencer_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected failure outcome",
        )));
    };
    if message.contains(&text) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure mentioning '{text}', got: {message}"
        )))
    }
}

#[then("the first address has DNS label \"{label}\"")]
fn first_address_label(sequencer_context: &SequencerContext, label: String) -> Result<(), StepError> {
    let report = success(sequencer_context)?;
    expect_label(report.first_address.dns_label.as_deref(), &label)
}

#[then("the second address has DNS label \"{label}\"")]
fn second_address_label(
    sequencer_context: &SequencerContext,
    label: String,
) -> Result<(), StepError> {
    let report = success(sequencer_context)?;
    expect_label(report.second_address.dns_label.as_deref(), &label)
}

#[then("the interface has no public IP when the address is deleted")]
fn address_unbound_at_delete(sequencer_context: &SequencerContext) -> Result<(), StepError> {
    let calls = sequencer_context.cloud.calls();
    let deletes: Vec<&Call> = calls
        .iter()
        .filter(|call| matches!(call, Call::DeletePublicIp { .. }))
        .collect();
    if deletes.is_empty() {
        return Err(StepError::Assertion(String::from(
            "expected a public IP delete",
        )));
    }
    if deletes
        .iter()
        .any(|call| matches!(call, Call::DeletePublicIp { bound: true, .. }))
    {
        return Err(StepError::Assertion(format!(
            "public IP deleted while bound: {deletes:?}"
        )));
    }
    Ok(())
}

#[then("the address \"{name}\" is deleted")]
fn address_deleted(sequencer_context: &SequencerContext, name: String) -> Result<(), StepError> {
    let suffix = format!("/{name}");
    let deleted = sequencer_context.cloud.count_calls(
        |call| matches!(call, Call::DeletePublicIp { id, .. } if id.ends_with(&suffix)),
    );
    if deleted == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected one delete of {name}, saw {deleted}"
        )))
    }
}

#[then("the resource group \"{name}\" is deleted exactly once")]
fn group_deleted_once(sequencer_context: &SequencerContext, name: String) -> Result<(), StepError> {
    let deletes = sequencer_context.cloud.count_calls(
        |call| matches!(call, Call::DeleteResourceGroup { name: deleted } if *deleted == name),
    );
    if deletes != 1 {
        return Err(StepError::Assertion(format!(
            "expected one delete of {name}, saw {deletes}"
        )));
    }
    if sequencer_context.cloud.has_group(&name) {
        return Err(StepError::Assertion(format!("{name} still exists")));
    }
    Ok(())
}

#[then("no resource group delete is issued")]
fn no_group_delete(sequencer_context: &SequencerContext) -> Result<(), StepError> {
    no_calls_matching(sequencer_context, "resource group delete", |call| {
        matches!(call, Call::DeleteResourceGroup { .. })
    })
}

#[then("no public IP delete is issued")]
fn no_address_delete(sequencer_context: &SequencerContext) -> Result<(), StepError> {
    no_calls_matching(sequencer_context, "public IP delete", |call| {
        matches!(call, Call::DeletePublicIp { .. })
    })
}

#[then("the repeated delete succeeds")]
fn repeated_delete_succeeds(sequencer_context: &SequencerContext) -> Result<(), StepError> {
    match &sequencer_context.repeat_delete {
        Some(DeleteOutcome::Succeeded) => Ok(()),
        Some(DeleteOutcome::Failed(message)) => Err(StepError::Assertion(format!(
            "repeated delete failed: {message}"
        ))),
        None => Err(StepError::Assertion(String::from(
            "repeated delete was not attempted",
        ))),
    }
}

fn success(sequencer_context: &SequencerContext) -> Result<&pipswap::RunReport, StepError> {
    match &sequencer_context.outcome {
        Some(RunOutcome::Success(report)) => Ok(report.as_ref()),
        other => Err(StepError::Assertion(format!(
            "expected success outcome, got {other:?}"
        ))),
    }
}

fn expect_label(actual: Option<&str>, expected: &str) -> Result<(), StepError> {
    if actual == Some(expected) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected DNS label {expected}, got {actual:?}"
        )))
    }
}

fn no_calls_matching(
    sequencer_context: &SequencerContext,
    what: &str,
    predicate: impl Fn(&Call) -> bool,
) -> Result<(), StepError> {
    let count = sequencer_context.cloud.count_calls(predicate);
    if count == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no {what}, saw {count}"
        )))
    }
}

fn parse_operation(name: &str) -> Result<Operation, StepError> {
    match name {
        "authenticate" => Ok(Operation::Authenticate),
        "create-resource-group" => Ok(Operation::CreateResourceGroup),
        "create-public-ip" => Ok(Operation::CreatePublicIp),
        "create-virtual-machine" => Ok(Operation::CreateVirtualMachine),
        "refresh-virtual-machine" => Ok(Operation::RefreshVirtualMachine),
        "primary-public-ip" => Ok(Operation::PrimaryPublicIp),
        "update-primary-public-ip" => Ok(Operation::UpdatePrimaryPublicIp),
        "detach-public-ip" => Ok(Operation::DetachPublicIp),
        "delete-public-ip" => Ok(Operation::DeletePublicIp),
        "delete-resource-group" => Ok(Operation::DeleteResourceGroup),
        _ => Err(StepError::Assertion(format!("unknown operation: {name}"))),
    }
}
