//! Environment-style key/value lookup.
//!
//! The resolver works on a snapshot taken once at startup, so the rest of the
//! run never reads process-global state. Tests build one from explicit pairs.

use std::collections::HashMap;

use tracing::debug;

use crate::config::ConfigError;

/// Primary backend host.
pub const DB_HOST: &str = "DB_HOST_ENV";
/// Primary backend port.
pub const DB_PORT: &str = "DB_PORT_ENV";
/// Primary backend user.
pub const DB_USER: &str = "DB_USER_ENV";
/// Primary backend password.
pub const DB_PASS: &str = "DB_PASS_ENV";
/// Primary backend database name.
pub const DB_NAME: &str = "DB_NAME_ENV";
/// Directory receiving the log file.
pub const PATH_LOGS: &str = "PATH_LOGS";

/// Snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Snapshot the process environment, loading a `.env` file first if one exists.
    ///
    /// Variables already set in the process take precedence over `.env`.
    #[must_use]
    pub fn from_process() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => debug!(error = %e, "ignoring unreadable .env file"),
        }
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build an environment from explicit key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Return the value of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if the key is unset and
    /// [`ConfigError::Empty`] if it is blank or whitespace-only.
    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        let value = self.vars.get(key).ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })?;

        if value.trim().is_empty() {
            return Err(ConfigError::Empty {
                key: key.to_string(),
            });
        }

        Ok(value.clone())
    }

    /// Return the value of `key` if it is set and not blank.
    #[must_use]
    pub fn optional(&self, key: &str) -> Option<String> {
        self.require(key).ok()
    }
}
