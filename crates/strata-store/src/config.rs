//! Store configuration
//!
//! Loaded from TOML; every section and key is optional.
//!
//! ```toml
//! [database]
//! path = "strata.db"
//! foreign_keys = true
//! journal_mode = "WAL"
//! busy_timeout_ms = 5000
//!
//! [logging]
//! profile = "development"
//! ```

use crate::errors::{config_error, io_error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use strata_core::logging_facility::Profile;

/// Environment variable replacing `database.path`
pub const DATABASE_PATH_ENV: &str = "STRATA_DATABASE_PATH";

/// Path value selecting an in-memory database
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub foreign_keys: bool,
    /// `None` leaves the engine default in place
    pub journal_mode: Option<String>,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(IN_MEMORY),
            foreign_keys: true,
            journal_mode: None,
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub profile: Profile,
}

impl StoreConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| config_error(format!("Invalid config: {}", e)))
    }

    /// Read a TOML file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| io_error("config_load", e))?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(DATABASE_PATH_ENV) {
            if !path.trim().is_empty() {
                self.database.path = PathBuf::from(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_in_memory_with_foreign_keys() {
        let config = StoreConfig::default();
        assert!(config.database.is_in_memory());
        assert!(config.database.foreign_keys);
        assert_eq!(config.logging.profile, Profile::Development);
    }

    #[test]
    fn test_parse_full_config() {
        let config = StoreConfig::from_toml_str(
            r#"
[database]
path = "shop.db"
foreign_keys = false
journal_mode = "WAL"
busy_timeout_ms = 250

[logging]
profile = "production"
"#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("shop.db"));
        assert!(!config.database.foreign_keys);
        assert_eq!(config.database.journal_mode.as_deref(), Some("WAL"));
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.logging.profile, Profile::Production);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = StoreConfig::from_toml_str("[database]\npath = \"x.db\"\n").unwrap();
        assert!(config.database.foreign_keys);
        assert_eq!(config.database.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = StoreConfig::from_toml_str("[database]\nport = 5432\n").unwrap_err();
        assert_eq!(err.code(), "ERR_CONFIG");
    }
}
