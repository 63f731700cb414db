use std::fmt;
use std::time::Duration;

use uuid::Uuid;

pub const DEFAULT_QUEUE: &str = "default";
pub const LOW_QUEUE: &str = "low";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of background work. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMessage {
    pub task_type: String,
    pub payload: Vec<u8>,
    pub max_retries: u32,
    pub timeout: Duration,
    pub queue: String,
}

impl TaskMessage {
    pub fn new(task_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TASK_TIMEOUT,
            queue: DEFAULT_QUEUE.to_string(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }
}

/// One delivery attempt of a task handed out by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDelivery {
    pub id: TaskId,
    pub message: TaskMessage,
    /// Number of earlier attempts that failed.
    pub retried: u32,
}

impl TaskDelivery {
    pub fn new(id: TaskId, message: TaskMessage, retried: u32) -> Self {
        Self {
            id,
            message,
            retried,
        }
    }

    pub fn task_type(&self) -> &str {
        &self.message.task_type
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retried >= self.message.max_retries
    }
}
