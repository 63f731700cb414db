use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::ports::{BrokerError, QueueInspector};

use super::health_report::breach_level;
use super::{
    Alert, AlertLevel, HealthStatus, HealthThresholds, SystemMetrics, TaskMetricsSnapshot,
};

pub const MAX_DURATION_SAMPLES: usize = 100;
pub const DEFAULT_ESTIMATED_TASK_DURATION: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct TaskCounters {
    success_count: u64,
    failure_count: u64,
    durations: VecDeque<Duration>,
}

impl TaskCounters {
    fn record(&mut self, duration: Duration, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        if self.durations.len() == MAX_DURATION_SAMPLES {
            self.durations.pop_front();
        }
        self.durations.push_back(duration);
    }

    fn snapshot(&self) -> TaskMetricsSnapshot {
        let total = self.success_count + self.failure_count;
        let millis = |d: &Duration| d.as_secs_f64() * 1000.0;
        let sample_count = self.durations.len();

        let (avg, min, max) = if sample_count == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let sum: f64 = self.durations.iter().map(millis).sum();
            let min = self.durations.iter().map(millis).fold(f64::MAX, f64::min);
            let max = self.durations.iter().map(millis).fold(0.0, f64::max);
            (sum / sample_count as f64, min, max)
        };

        TaskMetricsSnapshot {
            success_count: self.success_count,
            failure_count: self.failure_count,
            success_rate: success_rate(self.success_count, total),
            avg_duration_ms: avg,
            min_duration_ms: min,
            max_duration_ms: max,
            sample_count,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct QueueSnapshot {
    queue_depth: u64,
    active: u64,
    processing_lag: Duration,
    last_error: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

struct QueueMonitor {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Process-local task outcome counters and queue gauges. Nothing is persisted;
/// everything resets when the worker restarts.
pub struct MetricsCollector {
    inspector: Arc<dyn QueueInspector>,
    queues: Vec<String>,
    estimated_task_duration: Duration,
    tasks: Mutex<HashMap<String, TaskCounters>>,
    queue: Mutex<QueueSnapshot>,
    monitor: Mutex<Option<QueueMonitor>>,
}

impl MetricsCollector {
    pub fn new(inspector: Arc<dyn QueueInspector>, queues: Vec<String>) -> Self {
        Self {
            inspector,
            queues,
            estimated_task_duration: DEFAULT_ESTIMATED_TASK_DURATION,
            tasks: Mutex::new(HashMap::new()),
            queue: Mutex::new(QueueSnapshot::default()),
            monitor: Mutex::new(None),
        }
    }

    /// Per-task time used to turn the pending count into a lag estimate.
    pub fn with_estimated_task_duration(mut self, duration: Duration) -> Self {
        self.estimated_task_duration = duration;
        self
    }

    pub fn record_task_success(&self, task_type: &str, duration: Duration) {
        self.record(task_type, duration, true);
    }

    pub fn record_task_failure(&self, task_type: &str, duration: Duration) {
        self.record(task_type, duration, false);
    }

    fn record(&self, task_type: &str, duration: Duration, success: bool) {
        lock(&self.tasks)
            .entry(task_type.to_string())
            .or_default()
            .record(duration, success);
    }

    pub fn task_metrics(&self, task_type: &str) -> Option<TaskMetricsSnapshot> {
        lock(&self.tasks).get(task_type).map(TaskCounters::snapshot)
    }

    pub fn all_task_metrics(&self) -> BTreeMap<String, TaskMetricsSnapshot> {
        lock(&self.tasks)
            .iter()
            .map(|(task_type, counters)| (task_type.clone(), counters.snapshot()))
            .collect()
    }

    /// Refreshes queue depth, active count and the lag estimate from the broker.
    /// The lag is `pending × estimated task duration`, a heuristic rather than
    /// measured latency.
    pub async fn update_queue_metrics(&self) -> Result<(), BrokerError> {
        let mut pending = 0u64;
        let mut active = 0u64;

        for queue in &self.queues {
            match self.inspector.queue_info(queue).await {
                Ok(info) => {
                    pending += info.pending;
                    active += info.active;
                }
                Err(e) => {
                    tracing::warn!(queue = %queue, error = %e, "Failed to read queue info");
                    lock(&self.queue).last_error = Some(format!("queue {}: {}", queue, e));
                    return Err(e);
                }
            }
        }

        let processing_lag = self
            .estimated_task_duration
            .saturating_mul(u32::try_from(pending).unwrap_or(u32::MAX));

        let mut snapshot = lock(&self.queue);
        snapshot.queue_depth = pending;
        snapshot.active = active;
        snapshot.processing_lag = processing_lag;
        snapshot.last_error = None;
        snapshot.updated_at = Some(Utc::now());

        tracing::debug!(
            queue_depth = pending,
            active,
            processing_lag_secs = processing_lag.as_secs(),
            "Queue metrics updated"
        );
        Ok(())
    }

    pub fn system_metrics(&self) -> SystemMetrics {
        let (processed, failed) = lock(&self.tasks)
            .values()
            .fold((0u64, 0u64), |(processed, failed), c| {
                (
                    processed + c.success_count + c.failure_count,
                    failed + c.failure_count,
                )
            });
        let queue = lock(&self.queue).clone();

        SystemMetrics {
            queue_depth: queue.queue_depth,
            processing_lag: queue.processing_lag.as_secs_f64(),
            active_workers: queue.active,
            total_processed: processed,
            total_failed: failed,
            overall_success_rate: success_rate(processed - failed, processed),
            updated_at: queue.updated_at,
        }
    }

    /// Evaluates current metrics against `thresholds` and assembles a health snapshot.
    pub fn check_health(&self, thresholds: &HealthThresholds, started_at: Instant) -> HealthStatus {
        let system = self.system_metrics();
        let tasks = self.all_task_metrics();
        let queue_error = lock(&self.queue).last_error.clone();
        let mut alerts = Vec::new();

        if let Some(error) = queue_error {
            alerts.push(
                Alert::new(
                    AlertLevel::Error,
                    "queue_metrics_unavailable",
                    format!("Queue metrics could not be refreshed: {}", error),
                )
                .with_metadata("error", error),
            );
        }

        if system.total_processed > 0 {
            if let Some(level) =
                success_rate_breach(system.overall_success_rate, thresholds.min_success_rate)
            {
                alerts.push(
                    Alert::new(
                        level,
                        "low_success_rate",
                        format!(
                            "Overall success rate {:.1}% is below {:.1}%",
                            system.overall_success_rate * 100.0,
                            thresholds.min_success_rate * 100.0
                        ),
                    )
                    .with_metadata("success_rate", system.overall_success_rate)
                    .with_metadata("threshold", thresholds.min_success_rate)
                    .with_metadata("total_processed", system.total_processed),
                );
            }
        }

        if thresholds.max_queue_depth > 0 {
            if let Some(level) =
                breach_level(system.queue_depth as f64, thresholds.max_queue_depth as f64)
            {
                alerts.push(
                    Alert::new(
                        level,
                        "high_queue_depth",
                        format!(
                            "Queue depth {} exceeds {}",
                            system.queue_depth, thresholds.max_queue_depth
                        ),
                    )
                    .with_metadata("queue_depth", system.queue_depth)
                    .with_metadata("threshold", thresholds.max_queue_depth),
                );
            }
        }

        let max_lag = thresholds.max_processing_lag.as_secs_f64();
        if max_lag > 0.0 {
            if let Some(level) = breach_level(system.processing_lag, max_lag) {
                alerts.push(
                    Alert::new(
                        level,
                        "high_processing_lag",
                        format!(
                            "Processing lag {:.0}s exceeds {:.0}s",
                            system.processing_lag, max_lag
                        ),
                    )
                    .with_metadata("processing_lag_secs", system.processing_lag)
                    .with_metadata("threshold_secs", max_lag),
                );
            }
        }

        for (task_type, metrics) in &tasks {
            if metrics.total() == 0 {
                continue;
            }
            let Some(level) =
                success_rate_breach(metrics.success_rate, thresholds.min_success_rate)
            else {
                continue;
            };
            alerts.push(
                Alert::new(
                    level,
                    "task_success_rate",
                    format!(
                        "Task type {} success rate {:.1}% is below {:.1}%",
                        task_type,
                        metrics.success_rate * 100.0,
                        thresholds.min_success_rate * 100.0
                    ),
                )
                .with_metadata("task_type", task_type.as_str())
                .with_metadata("success_rate", metrics.success_rate)
                .with_metadata("threshold", thresholds.min_success_rate),
            );
        }

        HealthStatus::from_alerts(alerts, system, tasks, started_at.elapsed())
    }

    /// Refreshes queue metrics every `interval` until `close` is called.
    pub fn spawn_queue_monitor(self: &Arc<Self>, interval: Duration) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let collector = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Failures are logged and surfaced as an alert by check_health.
                        let _ = collector.update_queue_metrics().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Queue monitor stopped");
        });

        let previous = lock(&self.monitor).replace(QueueMonitor {
            stop: stop_tx,
            handle,
        });
        if let Some(previous) = previous {
            let _ = previous.stop.send(true);
        }
    }

    /// Stops the queue monitor, if one is running.
    pub async fn close(&self) {
        let monitor = lock(&self.monitor).take();
        if let Some(monitor) = monitor {
            let _ = monitor.stop.send(true);
            if let Err(e) = monitor.handle.await {
                tracing::error!(error = %e, "Queue monitor terminated abnormally");
            }
        }
    }
}

/// Success rate is judged on its complement: the failure rate against the allowed failure rate.
fn success_rate_breach(rate: f64, min_success_rate: f64) -> Option<AlertLevel> {
    if min_success_rate <= 0.0 {
        return None;
    }
    breach_level(1.0 - rate, 1.0 - min_success_rate)
}

fn success_rate(successes: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        successes as f64 / total as f64
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
