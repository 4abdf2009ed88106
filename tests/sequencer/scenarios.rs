//! BDD scenarios for the provisioning sequencer.

use rstest_bdd_macros::scenario;

use super::test_helpers::{SequencerContext, sequencer_context};

#[scenario(
    path = "tests/features/sequencer.feature",
    name = "Swap public IPs on a fresh VM and clean up"
)]
fn scenario_end_to_end(sequencer_context: SequencerContext) {
    drop(sequencer_context);
}

#[scenario(
    path = "tests/features/sequencer.feature",
    name = "Authentication failure creates nothing"
)]
fn scenario_authentication_failure(sequencer_context: SequencerContext) {
    drop(sequencer_context);
}

#[scenario(
    path = "tests/features/sequencer.feature",
    name = "VM creation failure still deletes the resource group"
)]
fn scenario_vm_failure(sequencer_context: SequencerContext) {
    drop(sequencer_context);
}

#[scenario(
    path = "tests/features/sequencer.feature",
    name = "Cleanup failure does not mask the original error"
)]
fn scenario_cleanup_failure(sequencer_context: SequencerContext) {
    drop(sequencer_context);
}

#[scenario(
    path = "tests/features/sequencer.feature",
    name = "An unobserved rebind stops before deleting any address"
)]
fn scenario_unobserved_rebind(sequencer_context: SequencerContext) {
    drop(sequencer_context);
}

#[scenario(
    path = "tests/features/sequencer.feature",
    name = "A failed detach leaves the address to the group delete"
)]
fn scenario_detach_failure(sequencer_context: SequencerContext) {
    drop(sequencer_context);
}

#[scenario(
    path = "tests/features/sequencer.feature",
    name = "Deleting a resource group twice is harmless"
)]
fn scenario_repeated_delete(sequencer_context: SequencerContext) {
    drop(sequencer_context);
}
