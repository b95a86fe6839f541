//! PostgreSQL connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const fn default_max_connections() -> u32 {
    10
}

const fn default_acquire_timeout_secs() -> u64 {
    5
}

const fn default_statement_timeout_ms() -> u64 {
    15_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Connection URL (e.g., `postgres://app@localhost:5432/hub`).
    ///
    /// The role in the URL must not be a superuser or own the synced tables,
    /// otherwise row-level security policies are bypassed.
    #[serde(default)]
    pub url: String,

    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long to wait for a pooled connection before giving up.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// `statement_timeout` applied to every viewer transaction, in milliseconds.
    /// Zero disables it.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Check if a connection URL is present.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }

    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub const fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }

    /// Validate the section for use by a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotConfigured` without a URL, or
    /// `ConfigError::InvalidValue` for a zero-sized pool or a URL that is not
    /// a PostgreSQL URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_configured() {
            return Err(ConfigError::NotConfigured {
                section: "database".into(),
            });
        }
        if !(self.url.starts_with("postgres://") || self.url.starts_with("postgresql://")) {
            return Err(ConfigError::InvalidValue {
                field: "database.url".into(),
                reason: "expected a postgres:// or postgresql:// URL".into(),
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "database.max_connections".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
