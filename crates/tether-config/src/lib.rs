//! # tether-config
//!
//! Layered configuration loading for Tether using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`TETHER_*` prefix, `__` as separator)
//! 2. Project-level `.tether/config.toml`
//! 3. User-level `~/.config/tether/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `TETHER_DATABASE__URL` -> `database.url`,
//! `TETHER_AUTH__JWT_SECRET` -> `auth.jwt_secret`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use tether_config::TetherConfig;
//!
//! let config = TetherConfig::load_with_dotenv().expect("config");
//! if config.database.is_configured() {
//!     println!("max connections: {}", config.database.max_connections);
//! }
//! ```

mod auth;
mod database;
mod error;

pub use auth::AuthConfig;
pub use database::DatabaseConfig;
pub use error::ConfigError;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl TetherConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` if a source cannot be parsed or a value
    /// has the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment or layer more providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-global config
        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(global_path));
        }

        // Layer 2: Project-local config
        let local_path = PathBuf::from(".tether/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        // Layer 3: Environment variables (highest priority)
        figment.merge(Env::prefixed("TETHER_").split("__"))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tether").join("config.toml"))
    }

    /// Load `.env` from the workspace root, walking up from
    /// `CARGO_MANIFEST_DIR` when available. Silently does nothing if no
    /// `.env` is found.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace root
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let config = TetherConfig::default();
        assert!(!config.database.is_configured());
        assert!(!config.auth.is_configured());
    }

    #[test]
    fn figment_builds_without_files() {
        figment::Jail::expect_with(|jail| {
            // Stands in for a variable exported by the surrounding shell.
            jail.set_env("TETHER_DATABASE__URL", "postgres://ambient@localhost/hub");
            jail.clear_env();

            let config: TetherConfig = TetherConfig::figment().extract()?;
            assert!(!config.database.is_configured());
            assert_eq!(config.database.max_connections, 10);
            assert_eq!(config.auth.token_ttl_secs, 3600);
            Ok(())
        });
    }
}
