use serde::Deserialize;

use crate::{
    feedback::FeedbackConfig, guard::GuardConfig, utils::error::ToolpassError,
    validator::ValidatorConfig,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub validator: ValidatorConfig,

    #[serde(default)]
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port the server listens on (default 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in ms before the server returns 408
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,

    /// When set, logs are also written to a daily-rotated file in this directory
    pub log_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            request_timeout_ms: default_timeout_ms(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Http,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Base URL of the persistence/auth REST service (http backend)
    pub api_url: Option<String>,

    /// Service key sent as `apikey` to the REST service
    pub api_key: Option<String>,

    /// Postgres connection string (postgres backend)
    pub database_url: Option<String>,

    /// Header set by the upstream auth proxy carrying the verified user id
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Timeout for a single store round trip in ms
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,

    /// JSON array of subscriptions loaded at startup (memory backend)
    pub seed_file: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            api_url: None,
            api_key: None,
            database_url: None,
            identity_header: default_identity_header(),
            timeout_ms: default_store_timeout_ms(),
            seed_file: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ToolpassError> {
        dotenvy::dotenv().ok();

        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::with_name("toolpass").required(false))
            .add_source(
                config::Environment::with_prefix("TOOLPASS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ToolpassError> {
        match self.store.backend {
            StoreBackend::Http => {
                if self.store.api_url.as_deref().unwrap_or("").is_empty() {
                    return Err(ToolpassError::ConfigError(
                        "store.api_url must be set when store.backend is http".to_string(),
                    ));
                }
            }
            StoreBackend::Postgres => {
                if self.store.database_url.as_deref().unwrap_or("").is_empty() {
                    return Err(ToolpassError::ConfigError(
                        "store.database_url must be set when store.backend is postgres"
                            .to_string(),
                    ));
                }
            }
            StoreBackend::Memory => {}
        }

        self.guard.validate()?;
        self.validator.validate()?;
        Ok(())
    }
}

fn default_port() -> u16 {
    8080
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_store_timeout_ms() -> u64 {
    2_000
}
fn default_identity_header() -> String {
    "x-user-id".to_string()
}
