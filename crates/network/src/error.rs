// crates/network/src/error.rs
//! Error types for network operations

use bookplayer_resilience::ResilienceError;
use thiserror::Error;

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// How a failed remote call should be treated by its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient; the same call may succeed later
    Retryable,
    /// The call can never succeed as issued
    Terminal,
    /// Local filesystem problem
    LocalIo,
    /// Aborted by the caller
    Cancelled,
}

/// Errors that can occur during network operations
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Transport-level request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Response body did not match the expected shape
    #[error("Unexpected response body: {0}")]
    Decode(String),

    /// Download failed
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Timeout
    #[error("Operation timed out")]
    Timeout,

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Resilience error
    #[error("Resilience error: {0}")]
    Resilience(#[from] ResilienceError),
}

impl NetworkError {
    /// Classifies the error for retry decisions
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            NetworkError::Http(e) => {
                if let Some(status) = e.status() {
                    Self::status_kind(status.as_u16())
                } else if e.is_builder() || e.is_decode() {
                    FailureKind::Terminal
                } else {
                    FailureKind::Retryable
                }
            }
            NetworkError::Status { status, .. } => Self::status_kind(*status),
            NetworkError::Io(_) => FailureKind::LocalIo,
            NetworkError::InvalidUrl(_) | NetworkError::Decode(_) => FailureKind::Terminal,
            NetworkError::DownloadFailed(_) | NetworkError::Timeout => FailureKind::Retryable,
            NetworkError::Cancelled => FailureKind::Cancelled,
            NetworkError::Resilience(ResilienceError::Timeout(_)) => FailureKind::Retryable,
            NetworkError::Resilience(ResilienceError::Cancelled) => FailureKind::Cancelled,
        }
    }

    fn status_kind(status: u16) -> FailureKind {
        match status {
            408 | 429 => FailureKind::Retryable,
            400..=499 => FailureKind::Terminal,
            _ => FailureKind::Retryable,
        }
    }

    /// Returns true if the error is retryable
    pub fn is_retryable(&self) -> bool {
        self.failure_kind() == FailureKind::Retryable
    }

    /// HTTP status code, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Status { status, .. } => Some(*status),
            NetworkError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if the remote reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
