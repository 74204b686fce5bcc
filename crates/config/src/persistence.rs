//! Reading and atomically replacing `config.toml`
//!
//! A save writes a sibling temp file and renames it over the old one, after
//! copying the old file to `config.toml.backup`.

use crate::{Config, ConfigError, ConfigResult, ValidationError, CONFIG_VERSION};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

pub struct ConfigPersistence {
    config_path: PathBuf,
}

impl ConfigPersistence {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Missing file means defaults; an empty or unparsable one is an error
    pub fn load(&self) -> ConfigResult<Config> {
        let path = &self.config_path;
        if !path.exists() {
            log::info!("No sync config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;

        // Empty means a truncated write, not a request for defaults
        if contents.trim().is_empty() {
            return Err(ConfigError::ReadError {
                path: path.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "config file is empty",
                ),
            });
        }

        let mut config: Config = toml::from_str(&contents).map_err(|source| {
            ConfigError::ParseError {
                path: path.clone(),
                source,
            }
        })?;

        if config.version != CONFIG_VERSION {
            log::warn!(
                "Reading version {} config as version {}",
                config.version,
                CONFIG_VERSION
            );
            config.version = CONFIG_VERSION;
        }

        // Hand-edited values only warn; the engine clamps what it cannot use
        if let Err(errors) = config.validate() {
            log::warn!("Sync config has invalid values: {}", join_errors(&errors));
        }

        Ok(config)
    }

    /// Refuses invalid configs; otherwise backs up the old file and swaps in the new one
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        config
            .validate()
            .map_err(|errors| ConfigError::ValidationError(join_errors(&errors)))?;

        let dir = self
            .config_path
            .parent()
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: format!("{} has no parent directory", self.config_path.display()),
            })?;
        fs::create_dir_all(dir).map_err(|source| ConfigError::DirectoryCreationError {
            path: dir.to_path_buf(),
            source,
        })?;

        if self.config_path.exists() {
            let backup = self.config_path.with_extension("toml.backup");
            fs::copy(&self.config_path, &backup)
                .map_err(|source| ConfigError::BackupError { source })?;
            log::debug!("Kept previous sync config as {}", backup.display());
        }

        let contents = toml::to_string_pretty(config)?;
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(contents.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.config_path)
            .map_err(|e| ConfigError::WriteError {
                path: self.config_path.clone(),
                source: e.error,
            })?;

        log::info!("Saved sync config to {}", self.config_path.display());
        Ok(())
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
