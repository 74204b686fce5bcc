//! Download configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and how remote item bytes are fetched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    /// Local library root that relative paths resolve against
    pub downloads_dir: PathBuf,

    /// Files of one folder transferred concurrently
    pub parallel_transfers: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("library"),
            parallel_transfers: 2,
        }
    }
}

impl ConfigSection for DownloadConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![Validator::in_range(
            self.parallel_transfers,
            1,
            8,
            "downloads.parallel_transfers",
        )];

        if self.downloads_dir.as_os_str().is_empty() {
            results.push(Err(ValidationError::new(
                "downloads.downloads_dir",
                "must not be empty",
            )));
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.downloads_dir = other.downloads_dir;
        self.parallel_transfers = other.parallel_transfers;
    }

    fn section_name(&self) -> &'static str {
        "downloads"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DownloadConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let config = DownloadConfig {
            downloads_dir: PathBuf::new(),
            parallel_transfers: 9,
        };
        assert_eq!(config.validate().unwrap_err().len(), 2);
    }
}
