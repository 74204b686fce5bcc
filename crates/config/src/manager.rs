//! Locating, loading and saving the sync config file

use crate::persistence::ConfigPersistence;
use crate::{Config, ConfigError, ConfigResult, LogLevel};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

/// Owns the config directory and the `config.toml` inside it
///
/// Relative paths in the file (queue database, downloads root) are taken
/// relative to this directory.
pub struct ConfigManager {
    persistence: ConfigPersistence,
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Uses the platform config directory, e.g. `~/.config/bookplayer/` on Linux
    pub fn new() -> ConfigResult<Self> {
        let dir = ProjectDirs::from("", "", "bookplayer")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: "no home directory to place bookplayer config in".to_string(),
            })?;
        Self::with_directory(dir)
    }

    pub fn with_directory(config_dir: PathBuf) -> ConfigResult<Self> {
        Ok(Self {
            persistence: ConfigPersistence::new(config_dir.join(CONFIG_FILE)),
            config_dir,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Anchors a relative configured path at the config directory
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Reads the file; a missing file yields defaults, a corrupt one an error
    pub fn load(&self) -> ConfigResult<Config> {
        self.persistence.load()
    }

    /// Like [`load`](Self::load), but a corrupt file falls back to defaults
    pub fn load_or_default(&self) -> Config {
        self.load().unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable config ({}), syncing with defaults", e);
            Config::default()
        })
    }

    /// Config ready to start an engine from
    ///
    /// Falls back to defaults, applies `BOOKPLAYER_*` overrides and anchors
    /// the queue database and downloads root at the config directory.
    pub fn load_for_engine(&self) -> Config {
        let mut config = self.load_or_default();
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        config.app.database_path = self.resolve_path(&config.app.database_path);
        config.downloads.downloads_dir = self.resolve_path(&config.downloads.downloads_dir);
        config
    }

    /// Validates and writes `config`, keeping the previous file as a backup
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.persistence.save(config)
    }

    /// Writes a default file unless one exists; true if it wrote one
    pub fn initialize(&self) -> ConfigResult<bool> {
        if self.config_path().exists() {
            return Ok(false);
        }
        self.save(&Config::default())?;
        log::info!("Wrote default sync config to {}", self.config_path().display());
        Ok(true)
    }

    /// Problems in the file on disk, one message per invalid field
    pub fn validate(&self) -> ConfigResult<Vec<String>> {
        Ok(match self.load()?.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(ToString::to_string).collect(),
        })
    }

    /// Loads the file and applies `BOOKPLAYER_SECTION_FIELD` environment overrides
    ///
    /// Recognised: `BOOKPLAYER_SYNC_API_BASE_URL`, `BOOKPLAYER_SYNC_AUTH_TOKEN`,
    /// `BOOKPLAYER_APP_LOG_LEVEL`, `BOOKPLAYER_APP_DATABASE_PATH`.
    pub fn load_with_env_overrides(&self) -> ConfigResult<Config> {
        let mut config = self.load()?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());

        if let Err(errors) = config.validate() {
            log::warn!("Config invalid after environment overrides: {:?}", errors);
        }
        Ok(config)
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("BOOKPLAYER_SYNC_API_BASE_URL") {
        config.sync.api_base_url = url;
    }

    if let Some(token) = var("BOOKPLAYER_SYNC_AUTH_TOKEN") {
        config.sync.auth_token = Some(token);
    }

    if let Some(level) = var("BOOKPLAYER_APP_LOG_LEVEL") {
        match level.parse::<LogLevel>() {
            Ok(level) => config.app.log_level = level,
            Err(e) => log::warn!("Ignoring log level override: {}", e),
        }
    }

    if let Some(db_path) = var("BOOKPLAYER_APP_DATABASE_PATH") {
        config.app.database_path = PathBuf::from(db_path);
    }
}
