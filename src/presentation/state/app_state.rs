use std::sync::Arc;
use std::time::Instant;

use crate::application::services::{HealthThresholds, MetricsCollector};

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsCollector>,
    pub thresholds: HealthThresholds,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(metrics: Arc<MetricsCollector>, thresholds: HealthThresholds) -> Self {
        Self {
            metrics,
            thresholds,
            started_at: Instant::now(),
        }
    }
}
