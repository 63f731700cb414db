mod settings_client_factory;

pub use settings_client_factory::{SettingsClientFactory, StaticClientFactory};
