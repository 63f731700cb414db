use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::application::ports::TaskBroker;
use crate::domain::{DEFAULT_QUEUE, LOW_QUEUE, TaskDelivery};

use super::task_middleware::{Deadline, panic_message};
use super::{
    ExponentialBackoff, LoggingMiddleware, MetricsCollector, RecoveryMiddleware, RetryPolicy,
    TaskError, TaskHandler, TaskMiddleware,
};

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Invoked once a task lands in the archive.
pub type ErrorCallback = Arc<dyn Fn(&TaskDelivery, &TaskError) + Send + Sync>;

/// Named queues with relative priorities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueWeights {
    entries: Vec<(String, u32)>,
}

impl QueueWeights {
    pub fn new(entries: Vec<(String, u32)>) -> Self {
        let mut entries: Vec<(String, u32)> =
            entries.into_iter().filter(|(_, weight)| *weight > 0).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Self { entries }
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order in which queues are tried for the given dequeue tick. Over a full
    /// cycle of `sum(weights)` ticks each queue leads exactly `weight` times;
    /// the others follow by descending weight so no queue starves while work exists.
    pub fn order(&self, tick: usize) -> Vec<&str> {
        let total: usize = self.entries.iter().map(|(_, w)| *w as usize).sum();
        if total == 0 {
            return Vec::new();
        }

        let mut slot = tick % total;
        let mut lead = 0;
        for (i, (_, weight)) in self.entries.iter().enumerate() {
            if slot < *weight as usize {
                lead = i;
                break;
            }
            slot -= *weight as usize;
        }

        let mut order = Vec::with_capacity(self.entries.len());
        order.push(self.entries[lead].0.as_str());
        order.extend(
            self.entries
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != lead)
                .map(|(_, (name, _))| name.as_str()),
        );
        order
    }
}

impl Default for QueueWeights {
    fn default() -> Self {
        Self::new(vec![
            (DEFAULT_QUEUE.to_string(), 6),
            (LOW_QUEUE.to_string(), 3),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub concurrency: usize,
    pub queues: QueueWeights,
    pub idle_poll_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            queues: QueueWeights::default(),
            idle_poll_interval: DEFAULT_IDLE_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("task type must not be empty")]
    EmptyTaskType,
    #[error("a handler is already registered for task type {0:?}")]
    DuplicateHandler(String),
    #[error("runtime already started")]
    AlreadyStarted,
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),
}

/// Fixed-size worker pool pulling tasks from a broker and dispatching them by type.
pub struct TaskWorkerRuntime {
    config: RuntimeConfig,
    broker: Arc<dyn TaskBroker>,
    metrics: Arc<MetricsCollector>,
    retry_policy: Arc<dyn RetryPolicy>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    middleware: Vec<Arc<dyn TaskMiddleware>>,
    error_callback: ErrorCallback,
    shutdown: Option<watch::Sender<bool>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskWorkerRuntime {
    pub fn new(
        config: RuntimeConfig,
        broker: Arc<dyn TaskBroker>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            broker,
            metrics,
            retry_policy: Arc::new(ExponentialBackoff::default()),
            handlers: HashMap::new(),
            middleware: vec![Arc::new(LoggingMiddleware), Arc::new(RecoveryMiddleware)],
            error_callback: Arc::new(log_archived_task),
            shutdown: None,
            workers: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Appended after the built-in logging and recovery middleware.
    pub fn with_middleware(mut self, middleware: Arc<dyn TaskMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.error_callback = callback;
        self
    }

    pub fn register_handler(
        &mut self,
        task_type: &str,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), RuntimeError> {
        if self.is_running() {
            return Err(RuntimeError::AlreadyStarted);
        }
        let task_type = task_type.trim();
        if task_type.is_empty() {
            return Err(RuntimeError::EmptyTaskType);
        }
        if self.handlers.contains_key(task_type) {
            return Err(RuntimeError::DuplicateHandler(task_type.to_string()));
        }
        self.handlers.insert(task_type.to_string(), handler);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Spawns the worker pool and returns immediately.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.is_running() {
            return Err(RuntimeError::AlreadyStarted);
        }
        if self.config.concurrency == 0 {
            return Err(RuntimeError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.config.queues.is_empty() {
            return Err(RuntimeError::InvalidConfig(
                "at least one queue with a positive weight is required".to_string(),
            ));
        }

        let handlers = self
            .handlers
            .iter()
            .map(|(task_type, handler)| (task_type.clone(), self.apply_middleware(handler)))
            .collect();

        let shared = Arc::new(Dispatcher {
            broker: Arc::clone(&self.broker),
            metrics: Arc::clone(&self.metrics),
            retry_policy: Arc::clone(&self.retry_policy),
            handlers,
            queues: self.config.queues.clone(),
            idle_poll_interval: self.config.idle_poll_interval,
            error_callback: Arc::clone(&self.error_callback),
            tick: AtomicUsize::new(0),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        for worker_id in 0..self.config.concurrency {
            let dispatcher = Arc::clone(&shared);
            let shutdown = shutdown_rx.clone();
            self.workers
                .push(tokio::spawn(dispatcher.run_worker(worker_id, shutdown)));
        }
        self.shutdown = Some(shutdown_tx);

        tracing::info!(
            concurrency = self.config.concurrency,
            queues = ?self.config.queues.queue_names(),
            task_types = ?self.handlers.keys().collect::<Vec<_>>(),
            "Task worker runtime started"
        );
        Ok(())
    }

    /// Signals the workers to stop and waits for in-flight tasks to finish.
    pub async fn shutdown(&mut self) {
        let Some(shutdown) = self.shutdown.take() else {
            return;
        };
        tracing::info!("Task worker runtime stopping, draining in-flight tasks");
        let _ = shutdown.send(true);

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Worker terminated abnormally");
            }
        }
        tracing::info!("Task worker runtime stopped");
    }

    fn apply_middleware(&self, handler: &Arc<dyn TaskHandler>) -> Arc<dyn TaskHandler> {
        let timed: Arc<dyn TaskHandler> = Arc::new(Deadline::new(Arc::clone(handler)));
        self.middleware
            .iter()
            .rev()
            .fold(timed, |next, middleware| middleware.wrap(next))
    }
}

struct Dispatcher {
    broker: Arc<dyn TaskBroker>,
    metrics: Arc<MetricsCollector>,
    retry_policy: Arc<dyn RetryPolicy>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    queues: QueueWeights,
    idle_poll_interval: Duration,
    error_callback: ErrorCallback,
    tick: AtomicUsize,
}

impl Dispatcher {
    async fn run_worker(self: Arc<Self>, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!(worker_id, "Worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.next_delivery().await {
                Ok(Some(delivery)) => self.execute(delivery).await,
                Ok(None) => {
                    if self.idle(&mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "Failed to dequeue task");
                    if self.idle(&mut shutdown).await {
                        break;
                    }
                }
            }
        }
        tracing::debug!(worker_id, "Worker stopped");
    }

    /// Returns true when the worker should stop.
    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
            _ = tokio::time::sleep(self.idle_poll_interval) => false,
        }
    }

    async fn next_delivery(
        &self,
    ) -> Result<Option<TaskDelivery>, crate::application::ports::BrokerError> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        for queue in self.queues.order(tick) {
            if let Some(delivery) = self.broker.dequeue(queue).await? {
                return Ok(Some(delivery));
            }
        }
        Ok(None)
    }

    async fn execute(&self, delivery: TaskDelivery) {
        let Some(handler) = self.handlers.get(delivery.task_type()) else {
            let error = TaskError::UnknownTaskType(delivery.task_type().to_string());
            self.metrics
                .record_task_failure(delivery.task_type(), Duration::ZERO);
            self.handle_failure(&delivery, error).await;
            return;
        };

        let started = Instant::now();
        match handler.process(&delivery).await {
            Ok(()) => {
                if let Err(e) = self.broker.ack(&delivery).await {
                    tracing::error!(
                        task_id = %delivery.id,
                        error = %e,
                        "Failed to acknowledge task"
                    );
                }
            }
            Err(error) => {
                // Handlers report their own outcomes; these two never reach that point.
                if matches!(error, TaskError::Panicked(_) | TaskError::TimedOut(_)) {
                    self.metrics
                        .record_task_failure(delivery.task_type(), started.elapsed());
                }
                self.handle_failure(&delivery, error).await;
            }
        }
    }

    async fn handle_failure(&self, delivery: &TaskDelivery, error: TaskError) {
        let message = error.to_string();

        if error.is_retryable() && !delivery.retries_exhausted() {
            let delay = self
                .retry_policy
                .retry_delay(delivery.retried, &error, &delivery.message);
            tracing::warn!(
                task_id = %delivery.id,
                task_type = %delivery.task_type(),
                retried = delivery.retried,
                max_retries = delivery.message.max_retries,
                delay_secs = delay.as_secs(),
                error = %message,
                "Task failed, scheduling retry"
            );
            if let Err(e) = self.broker.retry(delivery, delay, &message).await {
                tracing::error!(
                    task_id = %delivery.id,
                    error = %e,
                    "Failed to schedule task retry"
                );
            }
            return;
        }

        if let Err(e) = self.broker.archive(delivery, &message).await {
            tracing::error!(task_id = %delivery.id, error = %e, "Failed to archive task");
        }

        let callback = Arc::clone(&self.error_callback);
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| callback(delivery, &error)));
        if let Err(panic) = outcome {
            tracing::error!(
                task_id = %delivery.id,
                panic = %panic_message(panic.as_ref()),
                "Error callback panicked"
            );
        }
    }
}

fn log_archived_task(delivery: &TaskDelivery, error: &TaskError) {
    tracing::error!(
        task_id = %delivery.id,
        task_type = %delivery.task_type(),
        queue = %delivery.message.queue,
        retried = delivery.retried,
        error = %error,
        "Task archived after exhausting retries"
    );
}
