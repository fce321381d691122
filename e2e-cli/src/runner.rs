use std::sync::Arc;

use analytics_core::{build_message, BuildError, DeliveryClient};
use tracing::{debug, info};

use crate::error::RunError;
use crate::input::EventSequence;
use crate::outcome::CompletionState;

/// Plays event sequences through a delivery client it owns for exactly one run.
pub struct SequenceRunner<C> {
    client: C,
    state: Arc<CompletionState>,
}

impl<C: DeliveryClient> SequenceRunner<C> {
    /// `state` must be the callback the client reports completions to.
    pub fn new(client: C, state: Arc<CompletionState>) -> Self {
        Self { client, state }
    }

    /// Submit every sequence in order, then flush and shut the client down.
    ///
    /// A message that fails to build aborts the run; the client is still shut down.
    pub async fn run(self, sequences: &[EventSequence]) -> Result<(), RunError> {
        let submitted = match self.play(sequences).await {
            Ok(submitted) => submitted,
            Err(e) => {
                self.client.shutdown().await;
                return Err(e.into());
            }
        };

        debug!("submitted {} message(s), flushing", submitted);
        self.client.flush().await;
        self.client.shutdown().await;

        let result = self.state.result();
        info!(submitted, success = result.is_ok(), "run finished");
        result
    }

    async fn play(&self, sequences: &[EventSequence]) -> Result<usize, BuildError> {
        let mut submitted = 0;

        for (index, sequence) in sequences.iter().enumerate() {
            if let Some(delay) = sequence.delay() {
                debug!(sequence = index, delay_ms = sequence.delay_ms, "waiting");
                tokio::time::sleep(delay).await;
            }

            for event in &sequence.events {
                let message = build_message(event)?;
                debug!(
                    sequence = index,
                    kind = %message.kind(),
                    message_id = message.message_id(),
                    "enqueueing message"
                );
                self.client.enqueue(message);
                submitted += 1;
            }
        }

        Ok(submitted)
    }
}
