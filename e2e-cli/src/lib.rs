//! Replays timed sequences of analytics events against a collection endpoint and reports a
//! single pass/fail result.
use std::sync::Arc;

use analytics_core::config::Config;

pub mod error;
pub mod input;
pub mod outcome;
pub mod runner;

use crate::error::RunError;
use crate::input::CliInput;
use crate::outcome::{CompletionState, RunOutcome};
use crate::runner::SequenceRunner;

/// Run the raw `--input` payload to completion. Never fails: errors become a failed outcome.
pub async fn execute(raw_input: Option<&str>, defaults: &Config) -> RunOutcome {
    run(raw_input, defaults).await.into()
}

async fn run(raw_input: Option<&str>, defaults: &Config) -> Result<(), RunError> {
    let input = CliInput::parse(raw_input.ok_or(RunError::MissingInput)?)?;

    let state = Arc::new(CompletionState::default());
    let client = input
        .client_builder(defaults)
        .callback(state.clone())
        .build()?;

    SequenceRunner::new(client, state)
        .run(&input.sequences)
        .await
}
