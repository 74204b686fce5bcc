//! Error types and recovery strategies for the BookPlayer sync engine
//!
//! Errors are grouped in three severity tiers:
//! - **Recoverable**: retried on the next drain (network timeouts, locked database)
//! - **Degraded**: the affected item stalls but everything else continues
//! - **Fatal**: the local store itself is unusable (corrupted database, failed migration)
//!
//! Nothing in the engine turns an error into a process abort; severity only
//! guides what the caller shows and whether it retries.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Recovery actions that can be taken when an error occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry the operation immediately (e.g., transient network glitch)
    RetryImmediate,
    /// Retry with exponential backoff (e.g., server temporarily unavailable)
    RetryWithBackoff,
    /// Drop the offending work item and surface a notice
    DiscardAndNotify,
    /// Attempt to repair the database and retry
    RepairDatabase,
    /// No automatic recovery - user intervention required
    UserIntervention,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryImmediate => write!(f, "Retrying immediately"),
            Self::RetryWithBackoff => write!(f, "Retrying with backoff"),
            Self::DiscardAndNotify => write!(f, "Discarding and notifying"),
            Self::RepairDatabase => write!(f, "Repairing database"),
            Self::UserIntervention => write!(f, "User intervention required"),
        }
    }
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Error can be automatically recovered from
    Recoverable,
    /// Item degraded but the engine continues
    Degraded,
    /// Critical error requiring user action
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recoverable => write!(f, "Recoverable"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

/// Main error type shared by the BookPlayer crates
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Network Errors =====
    /// Network request failed
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network timeout
    #[error("Network timeout after {seconds}s: {operation}")]
    NetworkTimeout { operation: String, seconds: u64 },

    // ===== Database Errors =====
    /// Database operation failed
    #[error("Database error: {message}")]
    DatabaseError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database is corrupted and needs repair
    #[error("Database corrupted: {details}")]
    DatabaseCorrupted { details: String },

    /// Database migration failed
    #[error("Migration failed: {version} - {reason}")]
    MigrationFailed { version: String, reason: String },

    /// Record not found in database
    #[error("Record not found: {entity} with {identifier}")]
    RecordNotFound { entity: String, identifier: String },

    // ===== File System Errors =====
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Permission denied for file operation
    #[error("Permission denied: {operation} on {path}")]
    PermissionDenied { operation: String, path: PathBuf },

    /// Disk full - cannot write
    #[error("Disk full: needed {needed_bytes} bytes, available {available_bytes} bytes")]
    DiskFull {
        needed_bytes: u64,
        available_bytes: u64,
    },

    /// General I/O error
    #[error("I/O error: {message}")]
    IoError {
        message: String,
        #[source]
        source: io::Error,
    },

    // ===== Library / Queue Errors =====
    /// A relative path failed validation
    #[error("Invalid relative path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A persisted task payload could not be decoded
    #[error("Invalid {job_type} task payload: {reason}")]
    InvalidTaskPayload { job_type: String, reason: String },

    /// A lock guarding shared state was poisoned
    #[error("Lock poisoned: {resource}")]
    LockPoisoned { resource: String },

    // ===== General =====
    /// Operation was cancelled
    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    /// Internal invariant violated
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Returns the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NetworkError { .. }
            | Self::NetworkTimeout { .. }
            | Self::Cancelled { .. } => ErrorSeverity::Recoverable,

            Self::RecordNotFound { .. }
            | Self::FileNotFound { .. }
            | Self::InvalidPath { .. }
            | Self::InvalidTaskPayload { .. }
            | Self::IoError { .. } => ErrorSeverity::Degraded,

            Self::DatabaseCorrupted { .. }
            | Self::MigrationFailed { .. }
            | Self::DiskFull { .. }
            | Self::PermissionDenied { .. } => ErrorSeverity::Fatal,

            _ => ErrorSeverity::Degraded,
        }
    }

    /// Returns the recommended recovery action for this error
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            Self::NetworkTimeout { .. } => RecoveryAction::RetryImmediate,

            Self::NetworkError { .. } | Self::DatabaseError { .. } | Self::LockPoisoned { .. } => {
                RecoveryAction::RetryWithBackoff
            }

            Self::DatabaseCorrupted { .. } | Self::MigrationFailed { .. } => {
                RecoveryAction::RepairDatabase
            }

            Self::RecordNotFound { .. }
            | Self::FileNotFound { .. }
            | Self::InvalidPath { .. }
            | Self::InvalidTaskPayload { .. } => RecoveryAction::DiscardAndNotify,

            _ => RecoveryAction::UserIntervention,
        }
    }

    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            Self::NetworkError { .. } | Self::NetworkTimeout { .. } => {
                "Cannot reach the sync server. Changes will be uploaded later.".to_string()
            }
            Self::DatabaseError { .. } | Self::LockPoisoned { .. } => {
                "The sync queue is temporarily unavailable. Please try again.".to_string()
            }
            Self::DatabaseCorrupted { .. } | Self::MigrationFailed { .. } => {
                "The sync queue is damaged and needs repair.".to_string()
            }
            Self::RecordNotFound { .. } => "The requested item was not found.".to_string(),
            Self::FileNotFound { .. } => {
                "The file was not found. It may have been moved or deleted.".to_string()
            }
            Self::PermissionDenied { .. } => {
                "Permission denied. Please check storage access.".to_string()
            }
            Self::DiskFull { .. } => {
                "Not enough storage space. Please free up some space and try again.".to_string()
            }
            Self::IoError { .. } => "A file operation failed. Please try again.".to_string(),
            Self::InvalidPath { .. } | Self::InvalidTaskPayload { .. } => {
                "This item could not be synced.".to_string()
            }
            Self::Cancelled { .. } => "Operation was cancelled.".to_string(),
            Self::InternalError { .. } => {
                "An unexpected error occurred. Please try again.".to_string()
            }
        }
    }

    /// Returns true if this error is critical (fatal severity)
    pub fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Returns true if this error can be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.recovery_action(),
            RecoveryAction::RetryImmediate | RecoveryAction::RetryWithBackoff
        )
    }

    /// Helper to create a network error
    pub fn network<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Helper to create a database error
    pub fn database<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Helper for poisoned locks
    pub fn lock_poisoned(resource: impl Into<String>) -> Self {
        Self::LockPoisoned {
            resource: resource.into(),
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound {
                path: PathBuf::from("unknown"),
            },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                operation: "file operation".to_string(),
                path: PathBuf::from("unknown"),
            },
            _ => Self::IoError {
                message: err.to_string(),
                source: err,
            },
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError {
            message: format!("JSON error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_recovery_action_display() {
        assert_eq!(
            RecoveryAction::RetryImmediate.to_string(),
            "Retrying immediately"
        );
        assert_eq!(
            RecoveryAction::DiscardAndNotify.to_string(),
            "Discarding and notifying"
        );
        assert_eq!(
            RecoveryAction::UserIntervention.to_string(),
            "User intervention required"
        );
    }

    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Recoverable < ErrorSeverity::Degraded);
        assert!(ErrorSeverity::Degraded < ErrorSeverity::Fatal);
    }

    #[test]
    fn test_network_error_severity() {
        let err = AppError::NetworkError {
            message: "Connection failed".to_string(),
            source: None,
        };
        assert_eq!(err.severity(), ErrorSeverity::Recoverable);
        assert_eq!(err.recovery_action(), RecoveryAction::RetryWithBackoff);
        assert!(err.is_retryable());
        assert!(!err.is_critical());
    }

    #[test]
    fn test_invalid_payload_is_discarded() {
        let err = AppError::InvalidTaskPayload {
            job_type: "move".to_string(),
            reason: "missing destination".to_string(),
        };
        assert_eq!(err.recovery_action(), RecoveryAction::DiscardAndNotify);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("move"));
    }

    #[test]
    fn test_migration_failure_is_fatal() {
        let err = AppError::MigrationFailed {
            version: "1".to_string(),
            reason: "syntax error".to_string(),
        };
        assert!(err.is_critical());
        assert_eq!(err.recovery_action(), RecoveryAction::RepairDatabase);
    }

    #[test]
    fn test_database_helper_keeps_source() {
        let io = io::Error::new(io::ErrorKind::Other, "disk");
        let err = AppError::database("Failed to write task", io);
        assert!(err.to_string().contains("Failed to write task"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_from_io_error_not_found() {
        let err: AppError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, AppError::FileNotFound { .. }));
    }

    #[test]
    fn test_from_io_error_other() {
        let err: AppError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, AppError::IoError { .. }));
    }

    #[test]
    fn test_user_messages_are_friendly() {
        let err = AppError::lock_poisoned("task store");
        assert!(!err.user_message().contains("poisoned"));
    }
}
