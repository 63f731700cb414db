use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::application::ports::{BrokerError, QueueInfo, QueueInspector, TaskBroker};
use crate::domain::{TaskDelivery, TaskId, TaskMessage};

/// A task that ended up in the archive, with the error that put it there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedTask {
    pub delivery: TaskDelivery,
    pub error: String,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<TaskDelivery>,
    retry: Vec<(Instant, TaskDelivery)>,
    active: HashMap<TaskId, TaskDelivery>,
    archived: Vec<ArchivedTask>,
}

impl QueueState {
    /// Moves retries whose delay has elapsed to the back of the pending list.
    fn promote_due(&mut self, now: Instant) {
        if self.retry.is_empty() {
            return;
        }
        self.retry.sort_by_key(|(ready_at, _)| *ready_at);
        let due = self.retry.partition_point(|(ready_at, _)| *ready_at <= now);
        for (_, delivery) in self.retry.drain(..due) {
            self.pending.push_back(delivery);
        }
    }
}

/// Broker kept in process memory. Tasks do not survive a restart.
#[derive(Default)]
pub struct InMemoryTaskBroker {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl InMemoryTaskBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn archived(&self, queue: &str) -> Vec<ArchivedTask> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|state| state.archived.clone())
            .unwrap_or_default()
    }

    async fn take_active(&self, delivery: &TaskDelivery) -> Result<TaskDelivery, BrokerError> {
        self.queues
            .lock()
            .await
            .get_mut(&delivery.message.queue)
            .and_then(|state| state.active.remove(&delivery.id))
            .ok_or(BrokerError::TaskNotFound(delivery.id))
    }
}

#[async_trait]
impl QueueInspector for InMemoryTaskBroker {
    async fn queue_info(&self, queue: &str) -> Result<QueueInfo, BrokerError> {
        let mut queues = self.queues.lock().await;
        let Some(state) = queues.get_mut(queue) else {
            return Ok(QueueInfo::default());
        };
        state.promote_due(Instant::now());

        Ok(QueueInfo {
            pending: state.pending.len() as u64,
            active: state.active.len() as u64,
            scheduled: 0,
            retry: state.retry.len() as u64,
            archived: state.archived.len() as u64,
        })
    }
}

#[async_trait]
impl TaskBroker for InMemoryTaskBroker {
    async fn enqueue(&self, message: TaskMessage) -> Result<TaskId, BrokerError> {
        if message.task_type.trim().is_empty() {
            return Err(BrokerError::InvalidTask("task type is empty".to_string()));
        }
        let id = TaskId::new();
        let queue = message.queue.clone();
        self.queues
            .lock()
            .await
            .entry(queue)
            .or_default()
            .pending
            .push_back(TaskDelivery::new(id, message, 0));
        Ok(id)
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<TaskDelivery>, BrokerError> {
        let mut queues = self.queues.lock().await;
        let Some(state) = queues.get_mut(queue) else {
            return Ok(None);
        };
        state.promote_due(Instant::now());

        let Some(delivery) = state.pending.pop_front() else {
            return Ok(None);
        };
        state.active.insert(delivery.id, delivery.clone());
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &TaskDelivery) -> Result<(), BrokerError> {
        self.take_active(delivery).await.map(|_| ())
    }

    async fn retry(
        &self,
        delivery: &TaskDelivery,
        delay: Duration,
        _error: &str,
    ) -> Result<(), BrokerError> {
        let mut task = self.take_active(delivery).await?;
        task.retried += 1;

        self.queues
            .lock()
            .await
            .entry(task.message.queue.clone())
            .or_default()
            .retry
            .push((Instant::now() + delay, task));
        Ok(())
    }

    async fn archive(&self, delivery: &TaskDelivery, error: &str) -> Result<(), BrokerError> {
        let task = self.take_active(delivery).await?;

        self.queues
            .lock()
            .await
            .entry(task.message.queue.clone())
            .or_default()
            .archived
            .push(ArchivedTask {
                delivery: task,
                error: error.to_string(),
            });
        Ok(())
    }
}
