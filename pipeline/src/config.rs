use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::env::{Environment, PATH_LOGS};

/// Pipeline settings loaded from multiple sources.
///
/// Configuration is loaded in priority order (lowest to highest):
/// 1. Struct defaults
/// 2. config.yaml file (if exists)
/// 3. Environment variables with ETL_ prefix (always wins)
///
/// Primary database credentials are not part of this struct; they are
/// resolved separately through [`crate::env::Environment`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL of the open data API, without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on pages followed for a single paged resource.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Legislature identifier (56 = Feb 2019 to Jan 2023).
    #[serde(default = "default_legislature")]
    pub legislature: u32,

    /// Calendar year of the reimbursement documents.
    #[serde(default = "default_year")]
    pub year: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path of the local SQLite file used when the primary backend is not configured.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Maximum number of connections in the PostgreSQL pool; SQLite always uses one.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a connection before giving up.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory receiving `logs.log`. Overridden by `PATH_LOGS`.
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

// These functions cannot be const because serde uses function pointers for defaults
fn default_base_url() -> String {
    "https://dadosabertos.camara.leg.br/api/v2".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_timeout_secs() -> u64 {
    30
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_pages() -> u32 {
    1000
}

#[allow(clippy::missing_const_for_fn)]
fn default_legislature() -> u32 {
    56
}

#[allow(clippy::missing_const_for_fn)]
fn default_year() -> i32 {
    2022
}

fn default_sqlite_path() -> String {
    "database.db".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_connections() -> u32 {
    5
}

#[allow(clippy::missing_const_for_fn)]
fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_pages: default_max_pages(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            legislature: default_legislature(),
            year: default_year(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable '{key}' is not set")]
    Missing { key: String },

    #[error("environment variable '{key}' is empty")]
    Empty { key: String },

    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Earliest year the expense endpoint serves data for.
const FIRST_EXPENSE_YEAR: i32 = 2008;

impl Config {
    /// Snapshot the environment, then load configuration from all sources.
    ///
    /// The snapshot loads `.env` first, so `ETL_` keys placed there take part
    /// in layering. Sources are merged in priority order:
    /// 1. Struct defaults (lowest)
    /// 2. the YAML file at `yaml_path` (if exists)
    /// 3. Environment variables with ETL_ prefix (highest)
    ///
    /// `PATH_LOGS`, when set and non-blank, replaces `logging.dir`.
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn resolve(yaml_path: &str) -> Result<(Self, Environment), ConfigError> {
        let env = Environment::from_process();
        let mut config = Self::load_from(yaml_path)?;
        if let Some(dir) = env.optional(PATH_LOGS) {
            config.logging.dir = dir;
        }
        Ok((config, env))
    }

    /// Load configuration with a custom YAML file path.
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load_from(yaml_path: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed("ETL_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::Validation("api.base_url cannot be empty".into()));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "api.base_url must start with http:// or https://, got: '{base_url}'"
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Validation("api.timeout_secs cannot be 0".into()));
        }

        if self.api.max_pages == 0 {
            return Err(ConfigError::Validation("api.max_pages cannot be 0".into()));
        }

        if self.extraction.year < FIRST_EXPENSE_YEAR {
            return Err(ConfigError::Validation(format!(
                "extraction.year must be {FIRST_EXPENSE_YEAR} or later, got: {}",
                self.extraction.year
            )));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections cannot be 0".into(),
            ));
        }

        if self.database.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "database.connect_timeout_secs cannot be 0".into(),
            ));
        }

        Ok(())
    }
}
