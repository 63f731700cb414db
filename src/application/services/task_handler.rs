use std::time::Duration;

use async_trait::async_trait;

use crate::domain::TaskDelivery;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn process(&self, task: &TaskDelivery) -> Result<(), TaskError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(BoxError),
    /// Retrying cannot help; the task goes straight to the archive.
    #[error("{0} (not retryable)")]
    Permanent(BoxError),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("task timed out after {0:?}")]
    TimedOut(Duration),
    #[error("no handler registered for task type {0:?}")]
    UnknownTaskType(String),
}

impl TaskError {
    pub fn failed(error: impl Into<BoxError>) -> Self {
        TaskError::Failed(error.into())
    }

    pub fn permanent(error: impl Into<BoxError>) -> Self {
        TaskError::Permanent(error.into())
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            TaskError::Permanent(_) | TaskError::UnknownTaskType(_)
        )
    }
}
