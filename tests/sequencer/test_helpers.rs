//! Shared fixtures for sequencer BDD scenarios.

use pipswap::test_support::{FakeCloud, sample_config, sample_names};
use pipswap::{ConfigError, RunPlan, RunReport};
use rstest::fixture;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct SequencerContext {
    pub cloud: FakeCloud,
    pub plan: RunPlan,
    pub outcome: Option<RunOutcome>,
    pub repeat_delete: Option<DeleteOutcome>,
}

#[derive(Clone, Debug)]
pub enum DeleteOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Clone, Debug)]
pub enum RunOutcome {
    Success(Box<RunReport>),
    Failure(String),
}

#[derive(Clone, Debug, Error)]
pub enum SequencerTestError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type SequencerContextResult = Result<SequencerContext, SequencerTestError>;

#[fixture]
pub fn sequencer_context_result() -> SequencerContextResult {
    let plan = RunPlan::from_config(&sample_config(), sample_names())?;
    Ok(SequencerContext {
        cloud: FakeCloud::new(),
        plan,
        outcome: None,
        repeat_delete: None,
    })
}

#[fixture]
pub fn sequencer_context(sequencer_context_result: SequencerContextResult) -> SequencerContext {
    sequencer_context_result
        .unwrap_or_else(|err| panic!("sequencer context fixture should initialise: {err}"))
}
