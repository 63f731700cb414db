use std::collections::BTreeMap;
use std::time::Duration;

use config::{Config, ConfigError, File};
use serde::Deserialize;

use crate::application::services::{
    DEFAULT_CONCURRENCY, DEFAULT_ESTIMATED_TASK_DURATION, DEFAULT_IDLE_POLL_INTERVAL,
    DEFAULT_MAX_PROCESSING_LAG, DEFAULT_MAX_QUEUE_DEPTH, DEFAULT_MAX_WAIT,
    DEFAULT_MIN_SUCCESS_RATE, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_DELAY_CAP, HealthThresholds,
    PollerConfig, QueueWeights, RuntimeConfig,
};
use crate::domain::{DEFAULT_QUEUE, LOW_QUEUE};

use super::Environment;

/// Every section falls back to defaults suitable for a local run against
/// in-memory collaborators.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub worker: WorkerSettings,
    pub poller: PollerSettings,
    pub storage: StorageSettings,
    pub vertex: VertexSettings,
    pub database: DatabaseSettings,
    pub health: HealthSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Layers `appsettings.{Environment}.toml` (optional) under `APP_` environment
    /// variables, nested with `__` (e.g. `APP_WORKER__CONCURRENCY=4`).
    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                File::with_name(&format!("appsettings.{}", environment.as_str())).required(false),
            )
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
    /// Queue name to relative priority.
    pub queues: BTreeMap<String, u32>,
    pub retry_delay_cap_secs: u64,
    pub idle_poll_interval_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            queues: BTreeMap::from([(DEFAULT_QUEUE.to_string(), 6), (LOW_QUEUE.to_string(), 3)]),
            retry_delay_cap_secs: DEFAULT_RETRY_DELAY_CAP.as_secs(),
            idle_poll_interval_ms: DEFAULT_IDLE_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl WorkerSettings {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            concurrency: self.concurrency,
            queues: QueueWeights::new(self.queues.clone().into_iter().collect()),
            idle_poll_interval: Duration::from_millis(self.idle_poll_interval_ms),
        }
    }

    pub fn retry_delay_cap(&self) -> Duration {
        Duration::from_secs(self.retry_delay_cap_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub interval_secs: u64,
    pub max_wait_secs: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            max_wait_secs: DEFAULT_MAX_WAIT.as_secs(),
        }
    }
}

impl PollerSettings {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.interval_secs),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProviderSetting {
    Gcs,
    Local,
    #[default]
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub provider: StorageProviderSetting,
    pub bucket: Option<String>,
    pub service_account_path: Option<String>,
    pub local_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            provider: StorageProviderSetting::default(),
            bucket: None,
            service_account_path: None,
            local_path: "./data/objects".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VertexSettings {
    /// Base URL; defaults to the regional endpoint for `location`.
    pub endpoint: Option<String>,
    pub project_id: String,
    pub location: String,
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for VertexSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            project_id: String::new(),
            location: "us-central1".to_string(),
            access_token: None,
            request_timeout_secs: 30,
        }
    }
}

impl VertexSettings {
    pub fn base_url(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!("https://{}-aiplatform.googleapis.com", self.location)
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// In-memory repository and broker are used when unset.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub min_success_rate: f64,
    pub max_queue_depth: u64,
    pub max_processing_lag_secs: u64,
    pub monitor_interval_secs: u64,
    pub estimated_task_duration_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            min_success_rate: DEFAULT_MIN_SUCCESS_RATE,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            max_processing_lag_secs: DEFAULT_MAX_PROCESSING_LAG.as_secs(),
            monitor_interval_secs: 30,
            estimated_task_duration_ms: DEFAULT_ESTIMATED_TASK_DURATION.as_millis() as u64,
        }
    }
}

impl HealthSettings {
    pub fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            min_success_rate: self.min_success_rate,
            max_queue_depth: self.max_queue_depth,
            max_processing_lag: Duration::from_secs(self.max_processing_lag_secs),
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn estimated_task_duration(&self) -> Duration {
        Duration::from_millis(self.estimated_task_duration_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub enable_json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info,rag_ingest=debug".to_string(),
            enable_json: false,
        }
    }
}
