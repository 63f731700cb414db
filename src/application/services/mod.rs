mod health_report;
mod ingestion_handler;
mod ingestion_step;
mod metrics_collector;
mod operation_poller;
mod retry_policy;
mod task_handler;
mod task_middleware;
mod task_runtime;

pub use health_report::{
    Alert, AlertLevel, DEFAULT_MAX_PROCESSING_LAG, DEFAULT_MAX_QUEUE_DEPTH,
    DEFAULT_MIN_SUCCESS_RATE, HealthState, HealthStatus, HealthThresholds, SystemMetrics,
    TaskMetricsSnapshot, breach_level,
};
pub use ingestion_handler::{DocumentIngestionHandler, IngestionReport};
pub use ingestion_step::{Cleanup, IngestionError, IngestionStage, StepOutcome};
pub use metrics_collector::{
    DEFAULT_ESTIMATED_TASK_DURATION, MAX_DURATION_SAMPLES, MetricsCollector,
};
pub use operation_poller::{
    DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL, OperationPoller, PollError, PollOutcome, PollerConfig,
};
pub use retry_policy::{DEFAULT_RETRY_DELAY_CAP, ExponentialBackoff, RetryPolicy};
pub use task_handler::{BoxError, TaskError, TaskHandler};
pub use task_middleware::{CorrelationId, LoggingMiddleware, RecoveryMiddleware, TaskMiddleware};
pub use task_runtime::{
    DEFAULT_CONCURRENCY, DEFAULT_IDLE_POLL_INTERVAL, ErrorCallback, QueueWeights, RuntimeConfig,
    RuntimeError, TaskWorkerRuntime,
};
