use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_MIN_SUCCESS_RATE: f64 = 0.9;
pub const DEFAULT_MAX_QUEUE_DEPTH: u64 = 100;
pub const DEFAULT_MAX_PROCESSING_LAG: Duration = Duration::from_secs(300);

/// Limits above (or, for the success rate, below) which alerts are raised.
/// A zero queue depth or lag disables that check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    pub min_success_rate: f64,
    pub max_queue_depth: u64,
    pub max_processing_lag: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_success_rate: DEFAULT_MIN_SUCCESS_RATE,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            max_processing_lag: DEFAULT_MAX_PROCESSING_LAG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, alert_type: &str, message: String) -> Self {
        Self {
            level,
            alert_type: alert_type.to_string(),
            message,
            metadata: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskMetricsSnapshot {
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub sample_count: usize,
}

impl TaskMetricsSnapshot {
    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub queue_depth: u64,
    /// Estimated seconds to drain the pending backlog.
    pub processing_lag: f64,
    pub active_workers: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub overall_success_rate: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
    pub system_metrics: SystemMetrics,
    pub task_metrics: BTreeMap<String, TaskMetricsSnapshot>,
    pub alerts: Vec<Alert>,
    /// Seconds since the worker started.
    pub uptime: u64,
}

impl HealthStatus {
    pub fn from_alerts(
        alerts: Vec<Alert>,
        system_metrics: SystemMetrics,
        task_metrics: BTreeMap<String, TaskMetricsSnapshot>,
        uptime: Duration,
    ) -> Self {
        let worst = alerts.iter().map(|a| a.level).max();
        let status = match worst {
            None => HealthState::Healthy,
            Some(AlertLevel::Warning) => HealthState::Degraded,
            Some(_) => HealthState::Unhealthy,
        };

        Self {
            status,
            healthy: status != HealthState::Unhealthy,
            timestamp: Utc::now(),
            system_metrics,
            task_metrics,
            alerts,
            uptime: uptime.as_secs(),
        }
    }

    pub fn has_alert(&self, alert_type: &str) -> bool {
        self.alerts.iter().any(|a| a.alert_type == alert_type)
    }
}

/// Level for a value that must stay at or below `threshold`:
/// none up to 1×, warning up to 2×, critical beyond.
pub fn breach_level(value: f64, threshold: f64) -> Option<AlertLevel> {
    if value <= threshold {
        None
    } else if threshold <= 0.0 || value > threshold * 2.0 {
        Some(AlertLevel::Critical)
    } else {
        Some(AlertLevel::Warning)
    }
}
