use std::time::Duration;

use crate::domain::TaskMessage;

use super::TaskError;

pub const DEFAULT_RETRY_DELAY_CAP: Duration = Duration::from_secs(600);

/// Decides how long a failed task waits before its next attempt.
pub trait RetryPolicy: Send + Sync {
    /// `retried` is the number of attempts that already failed before this one.
    fn retry_delay(&self, retried: u32, error: &TaskError, task: &TaskMessage) -> Duration;
}

/// `min(2^retried minutes, cap)`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    cap: Duration,
}

impl ExponentialBackoff {
    pub fn new(cap: Duration) -> Self {
        Self { cap }
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY_CAP)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn retry_delay(&self, retried: u32, _error: &TaskError, _task: &TaskMessage) -> Duration {
        let minutes = 1u64.checked_shl(retried).unwrap_or(u64::MAX);
        Duration::from_secs(minutes.saturating_mul(60)).min(self.cap)
    }
}
