use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{TaskDelivery, TaskId, TaskMessage};

/// Counts of tasks in one queue, by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueInfo {
    pub pending: u64,
    pub active: u64,
    pub scheduled: u64,
    pub retry: u64,
    pub archived: u64,
}

#[async_trait]
pub trait QueueInspector: Send + Sync {
    async fn queue_info(&self, queue: &str) -> Result<QueueInfo, BrokerError>;
}

/// At-least-once task queue. A dequeued task stays active until it is acked,
/// rescheduled with `retry` or moved to the archive.
#[async_trait]
pub trait TaskBroker: QueueInspector {
    async fn enqueue(&self, message: TaskMessage) -> Result<TaskId, BrokerError>;

    async fn dequeue(&self, queue: &str) -> Result<Option<TaskDelivery>, BrokerError>;

    async fn ack(&self, delivery: &TaskDelivery) -> Result<(), BrokerError>;

    async fn retry(
        &self,
        delivery: &TaskDelivery,
        delay: Duration,
        error: &str,
    ) -> Result<(), BrokerError>;

    async fn archive(&self, delivery: &TaskDelivery, error: &str) -> Result<(), BrokerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    ConnectionFailed(String),
    #[error("broker query failed: {0}")]
    QueryFailed(String),
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("invalid task: {0}")]
    InvalidTask(String),
}
