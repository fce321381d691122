use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use analytics_core::{Callback, DeliveryError, TypedMessage};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::RunError;

/// The single line printed at the end of a run.
///
/// `sent_batches` is coarse: one on success, zero on failure. It does not count network requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub sent_batches: u32,
}

impl RunOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
            sent_batches: 1,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            sent_batches: 0,
        }
    }
}

impl From<Result<(), RunError>> for RunOutcome {
    fn from(result: Result<(), RunError>) -> Self {
        match result {
            Ok(()) => RunOutcome::succeeded(),
            Err(e) => RunOutcome::failed(e.to_string()),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serde_json::to_string(self).map_err(|_| fmt::Error)?)
    }
}

/// Failure state shared between the runner and the delivery client's completion callbacks.
#[derive(Debug, Default)]
pub struct CompletionState {
    failed: AtomicBool,
    first_error: Mutex<Option<String>>,
}

impl CompletionState {
    /// Record a delivery failure. Only the first message is kept.
    pub fn record_failure(&self, error: String) {
        let mut first_error = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if first_error.is_none() {
            *first_error = Some(error);
        }
        self.failed.store(true, Ordering::Release);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn first_error(&self) -> Option<String> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Meant to be read once the client has been flushed and shut down.
    pub fn result(&self) -> Result<(), RunError> {
        if !self.has_failed() {
            return Ok(());
        }

        Err(RunError::DeliveryFailure(
            self.first_error()
                .unwrap_or_else(|| "delivery failed".to_owned()),
        ))
    }
}

impl Callback for CompletionState {
    fn success(&self, message: &TypedMessage) {
        trace!(message_id = message.message_id(), "message delivered");
    }

    fn failure(&self, message: &TypedMessage, error: &DeliveryError) {
        warn!(
            message_id = message.message_id(),
            kind = %message.kind(),
            "message delivery failed: {}",
            error
        );
        self.record_failure(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn outcomes_serialize_with_camel_case_and_explicit_null() {
        assert_json_eq!(
            serde_json::to_value(RunOutcome::succeeded()).unwrap(),
            json!({"success": true, "error": null, "sentBatches": 1})
        );
        assert_eq!(
            RunOutcome::failed("boom").to_string(),
            r#"{"success":false,"error":"boom","sentBatches":0}"#
        );
    }

    #[test]
    fn only_the_first_failure_is_kept() {
        let state = CompletionState::default();
        assert!(state.result().is_ok());

        state.record_failure("first".to_owned());
        state.record_failure("second".to_owned());

        assert!(state.has_failed());
        assert_eq!(
            RunOutcome::from(state.result()),
            RunOutcome::failed("first")
        );
    }

    #[test]
    fn failures_from_other_threads_are_visible_after_join() {
        let state = Arc::new(CompletionState::default());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                thread::spawn(move || state.record_failure(format!("failure {i}")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(state.has_failed());
        let error = state.first_error().unwrap();
        assert!(error.starts_with("failure "), "unexpected error {error}");
    }
}
