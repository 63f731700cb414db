/// Configuration for tracing initialization.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub environment: String,
    pub json_format: bool,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl TracingConfig {
    pub const DEFAULT_FILTER: &'static str = "info,rag_ingest=debug,tower_http=debug";

    /// `LOG_FORMAT=json` forces JSON output regardless of `enable_json`.
    pub fn new(environment: impl Into<String>, level: &str, enable_json: bool) -> Self {
        let json_from_env = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let default_filter = if level.trim().is_empty() {
            Self::DEFAULT_FILTER.to_string()
        } else {
            level.trim().to_string()
        };

        Self {
            environment: environment.into(),
            json_format: enable_json || json_from_env,
            default_filter,
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::new(
            std::env::var("APP_ENV").unwrap_or_else(|_| "local".to_string()),
            Self::DEFAULT_FILTER,
            false,
        )
    }
}
