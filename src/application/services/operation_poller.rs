use std::time::Duration;

use tokio::time::Instant;

use crate::application::ports::{CorpusClient, CorpusClientError};
use crate::domain::{OperationError, OperationHandle};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(240);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// `done` without an error. Carries the raw response, `Null` when absent.
    Succeeded(serde_json::Value),
    Failed(OperationError),
    TimedOut { waited: Duration, polls: u32 },
}

#[derive(Debug, thiserror::Error)]
#[error("operation status request failed on poll {polls}: {source}")]
pub struct PollError {
    pub polls: u32,
    #[source]
    pub source: CorpusClientError,
}

/// Waits for a long-running operation by polling at a fixed interval.
/// Holds the calling task for up to `max_wait`.
#[derive(Debug, Clone, Default)]
pub struct OperationPoller {
    config: PollerConfig,
}

impl OperationPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    #[tracing::instrument(skip(self, client, operation), fields(operation = %operation))]
    pub async fn poll(
        &self,
        client: &dyn CorpusClient,
        operation: &OperationHandle,
    ) -> Result<PollOutcome, PollError> {
        let started = Instant::now();
        let deadline = started + self.config.max_wait;
        let mut polls = 0u32;

        loop {
            tokio::time::sleep(self.config.interval).await;
            polls += 1;

            let status = client
                .check_operation_status(operation)
                .await
                .map_err(|source| PollError { polls, source })?;

            if status.done {
                tracing::debug!(polls, "Operation reached terminal state");
                return Ok(match status.error {
                    Some(error) => PollOutcome::Failed(error),
                    None => {
                        PollOutcome::Succeeded(status.response.unwrap_or(serde_json::Value::Null))
                    }
                });
            }

            if Instant::now() >= deadline {
                let waited = started.elapsed();
                tracing::warn!(
                    polls,
                    waited_secs = waited.as_secs(),
                    "Operation still running at poll deadline"
                );
                return Ok(PollOutcome::TimedOut { waited, polls });
            }

            tracing::debug!(polls, "Operation still running");
        }
    }
}
