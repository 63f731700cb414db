use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::TaskDelivery;

use super::{TaskError, TaskHandler};

/// Wraps a handler with cross-cutting behaviour. The runtime applies
/// middleware in registration order, the first one being outermost.
pub trait TaskMiddleware: Send + Sync {
    fn wrap(&self, next: Arc<dyn TaskHandler>) -> Arc<dyn TaskHandler>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opens a `task` span carrying a fresh correlation id and logs start/finish with duration.
pub struct LoggingMiddleware;

impl TaskMiddleware for LoggingMiddleware {
    fn wrap(&self, next: Arc<dyn TaskHandler>) -> Arc<dyn TaskHandler> {
        Arc::new(Logged { next })
    }
}

struct Logged {
    next: Arc<dyn TaskHandler>,
}

#[async_trait]
impl TaskHandler for Logged {
    async fn process(&self, task: &TaskDelivery) -> Result<(), TaskError> {
        let correlation_id = CorrelationId::new();
        let span = tracing::info_span!(
            "task",
            correlation_id = %correlation_id,
            task_id = %task.id,
            task_type = %task.task_type(),
            retried = task.retried,
        );

        async {
            let started = Instant::now();
            tracing::info!(queue = %task.message.queue, "Task started");

            let result = self.next.process(task).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match &result {
                Ok(()) => tracing::info!(duration_ms, "Task finished"),
                Err(e) => tracing::warn!(duration_ms, error = %e, "Task finished with error"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Cuts a run short once the task's own timeout elapses. Sits directly
/// around the handler, inside every registered middleware.
pub(crate) struct Deadline {
    next: Arc<dyn TaskHandler>,
}

impl Deadline {
    pub(crate) fn new(next: Arc<dyn TaskHandler>) -> Self {
        Self { next }
    }
}

#[async_trait]
impl TaskHandler for Deadline {
    async fn process(&self, task: &TaskDelivery) -> Result<(), TaskError> {
        let timeout = task.message.timeout;
        match tokio::time::timeout(timeout, self.next.process(task)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Task deadline exceeded");
                Err(TaskError::TimedOut(timeout))
            }
        }
    }
}

/// Turns a panicking handler into a retryable `TaskError::Panicked`.
pub struct RecoveryMiddleware;

impl TaskMiddleware for RecoveryMiddleware {
    fn wrap(&self, next: Arc<dyn TaskHandler>) -> Arc<dyn TaskHandler> {
        Arc::new(Recovered { next })
    }
}

struct Recovered {
    next: Arc<dyn TaskHandler>,
}

#[async_trait]
impl TaskHandler for Recovered {
    async fn process(&self, task: &TaskDelivery) -> Result<(), TaskError> {
        match AssertUnwindSafe(self.next.process(task)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(panic = %message, "Recovered from panic in task handler");
                Err(TaskError::Panicked(message))
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
