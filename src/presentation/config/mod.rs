mod environment;
mod settings;

pub use environment::Environment;
pub use settings::{
    DatabaseSettings, HealthSettings, LoggingSettings, PollerSettings, ServerSettings, Settings,
    StorageProviderSetting, StorageSettings, VertexSettings, WorkerSettings,
};
