//! Remote sync configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};

/// Settings for replaying the task queue against the remote API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote content API
    pub api_base_url: String,

    /// Bearer token for the remote API
    pub auth_token: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Tasks pulled from the queue per drain
    pub batch_size: usize,

    /// Paths (lanes) replayed concurrently
    pub max_parallel_paths: usize,

    /// Background drain interval in seconds
    pub drain_interval_secs: u64,

    /// Minimum seconds between listing syncs of the same path (0 = no throttle)
    pub list_sync_interval_secs: u64,

    /// Number of error records kept for observability
    pub error_history: usize,

    /// Attempts per remote call before it counts as failed
    pub max_request_attempts: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.example.com/v1".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
            batch_size: 50,
            max_parallel_paths: 4,
            drain_interval_secs: 60,
            list_sync_interval_secs: 300,
            error_history: 50,
            max_request_attempts: 3,
        }
    }
}

impl ConfigSection for SyncConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::not_empty(&self.api_base_url, "sync.api_base_url"),
            Validator::in_range(self.request_timeout_secs, 1, 300, "sync.request_timeout_secs"),
            Validator::in_range(self.batch_size, 1, 500, "sync.batch_size"),
            Validator::in_range(self.max_parallel_paths, 1, 16, "sync.max_parallel_paths"),
            Validator::in_range(self.drain_interval_secs, 5, 3600, "sync.drain_interval_secs"),
            Validator::in_range(
                self.list_sync_interval_secs,
                0,
                86_400,
                "sync.list_sync_interval_secs",
            ),
            Validator::in_range(self.error_history, 1, 1000, "sync.error_history"),
            Validator::in_range(self.max_request_attempts, 1, 10, "sync.max_request_attempts"),
        ];

        if !self.api_base_url.trim().is_empty() {
            results.push(Validator::http_url(&self.api_base_url, "sync.api_base_url"));
        }

        if let Some(token) = &self.auth_token {
            results.push(Validator::not_empty(token, "sync.auth_token"));
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.api_base_url = other.api_base_url;
        if other.auth_token.is_some() {
            self.auth_token = other.auth_token;
        }
        self.request_timeout_secs = other.request_timeout_secs;
        self.batch_size = other.batch_size;
        self.max_parallel_paths = other.max_parallel_paths;
        self.drain_interval_secs = other.drain_interval_secs;
        self.list_sync_interval_secs = other.list_sync_interval_secs;
        self.error_history = other.error_history;
        self.max_request_attempts = other.max_request_attempts;
    }

    fn section_name(&self) -> &'static str {
        "sync"
    }
}
