//! BookPlayer Sync Configuration
//!
//! A TOML config file with one section per concern. Sections implement
//! `ConfigSection`, invalid files never panic, and writes are atomic.
//!
//! # Example
//!
//! ```rust,no_run
//! use bookplayer_config::{Config, ConfigManager};
//!
//! let manager = ConfigManager::new().expect("Failed to initialize config");
//! let config = manager.load().unwrap_or_else(|e| {
//!     eprintln!("Config error: {}, using defaults", e);
//!     Config::default()
//! });
//!
//! println!("Syncing against {}", config.sync.api_base_url);
//! ```

mod error;
mod manager;
mod persistence;
mod validation;

// Config sections
pub mod app_config;
mod download_config;
mod sync_config;

pub use error::{ConfigError, ConfigResult, ValidationError};
pub use manager::ConfigManager;
pub use validation::{ConfigSection, Validator};

pub use app_config::{AppConfig, LogLevel};
pub use download_config::DownloadConfig;
pub use sync_config::SyncConfig;

use serde::{Deserialize, Serialize};

/// Current config file format version
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Config file format version
    pub version: u32,

    /// Application-level settings
    pub app: AppConfig,

    /// Remote sync settings
    pub sync: SyncConfig,

    /// Download settings
    pub downloads: DownloadConfig,
}

impl Config {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the entire configuration
    ///
    /// Returns all validation errors found across all sections.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(mut e) = self.app.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.sync.validate() {
            errors.append(&mut e);
        }

        if let Err(mut e) = self.downloads.validate() {
            errors.append(&mut e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Merges this config with another, preferring values from `other`
    pub fn merge(&mut self, other: Config) {
        self.app.merge(other.app);
        self.sync.merge(other.sync);
        self.downloads.merge(other.downloads);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            app: AppConfig::default(),
            sync: SyncConfig::default(),
            downloads: DownloadConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn test_errors_from_every_section_are_collected() {
        let mut config = Config::default();
        config.app.database_path = Default::default();
        config.sync.batch_size = 0;
        config.downloads.parallel_transfers = 0;

        let errors = config.validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["app.database_path", "sync.batch_size", "downloads.parallel_transfers"]
        );
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        let mut override_config = Config::default();
        override_config.sync.max_parallel_paths = 8;

        base.merge(override_config);
        assert_eq!(base.sync.max_parallel_paths, 8);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[downloads]\nparallel_transfers = 3\n").unwrap();
        assert_eq!(config.downloads.parallel_transfers, 3);
        assert_eq!(config.sync, SyncConfig::default());
    }
}
