//! Error taxonomy for the update pipeline and its operations

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using hostpack-update's error type
pub type Result<T> = std::result::Result<T, UpdateError>;

/// Errors surfaced by release checks, backups, updates and restores
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Transport failure or unexpected HTTP status
    #[error("Network error: {message}")]
    Network { message: String },

    /// A request exceeded its timeout
    #[error("Request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    /// Release, asset or backup does not exist
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Pre-update backup could not be created or verified
    #[error("Backup failed: {message}")]
    Backup { message: String },

    /// Package download failed or did not verify
    #[error("Download failed: {message}")]
    Download { message: String },

    /// Downloaded package could not be read
    #[error("Package archive is corrupt: {message}")]
    ArchiveCorrupt { message: String },

    /// No payload root could be identified inside the package
    #[error("Unexpected package structure: {message}")]
    PayloadStructure { message: String },

    /// Merging the payload failed; the deployment was rolled back
    #[error("Merge failed: {message}")]
    Merge { message: String },

    /// Rolling back failed; the deployment must be restored by hand
    #[error("Rollback failed, restore manually from backup {}: {message}", backup.display())]
    Rollback { backup: PathBuf, message: String },

    /// Another invocation holds the update lock
    #[error("Another update is in progress (lock file {})", lock.display())]
    ConcurrentUpdate { lock: PathBuf },

    /// Configuration could not be loaded or is incomplete
    #[error("Configuration error: {0}")]
    Config(#[from] hostpack_core::Error),

    /// A version string is not a semantic version
    #[error("Invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    /// Restoring a backup failed
    #[error("Restore failed: {message}")]
    Restore { message: String },
}

/// Stable identifier for each error variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    NotFound,
    Backup,
    Download,
    ArchiveCorrupt,
    PayloadStructure,
    Merge,
    Rollback,
    ConcurrentUpdate,
    Config,
    InvalidVersion,
    Restore,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::Backup => "backup",
            Self::Download => "download",
            Self::ArchiveCorrupt => "archive_corrupt",
            Self::PayloadStructure => "payload_structure",
            Self::Merge => "merge",
            Self::Rollback => "rollback",
            Self::ConcurrentUpdate => "concurrent_update",
            Self::Config => "config",
            Self::InvalidVersion => "invalid_version",
            Self::Restore => "restore",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad an error is for the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Transient; trying again may succeed
    Recoverable,
    /// The operation stopped; the deployment is unchanged or was rolled back
    Fatal,
    /// The deployment may be inconsistent
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recoverable => f.write_str("recoverable"),
            Self::Fatal => f.write_str("fatal"),
            Self::Critical => f.write_str("critical"),
        }
    }
}

impl UpdateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Backup { .. } => ErrorKind::Backup,
            Self::Download { .. } => ErrorKind::Download,
            Self::ArchiveCorrupt { .. } => ErrorKind::ArchiveCorrupt,
            Self::PayloadStructure { .. } => ErrorKind::PayloadStructure,
            Self::Merge { .. } => ErrorKind::Merge,
            Self::Rollback { .. } => ErrorKind::Rollback,
            Self::ConcurrentUpdate { .. } => ErrorKind::ConcurrentUpdate,
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidVersion { .. } => ErrorKind::InvalidVersion,
            Self::Restore { .. } => ErrorKind::Restore,
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Network { .. } => Severity::Recoverable,
            Self::Rollback { .. } => Severity::Critical,
            _ => Severity::Fatal,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn backup(message: impl ToString) -> Self {
        Self::Backup {
            message: message.to_string(),
        }
    }

    pub fn download(message: impl ToString) -> Self {
        Self::Download {
            message: message.to_string(),
        }
    }

    pub fn archive_corrupt(message: impl ToString) -> Self {
        Self::ArchiveCorrupt {
            message: message.to_string(),
        }
    }

    pub fn payload_structure(message: impl ToString) -> Self {
        Self::PayloadStructure {
            message: message.to_string(),
        }
    }

    pub fn merge(message: impl ToString) -> Self {
        Self::Merge {
            message: message.to_string(),
        }
    }

    pub fn rollback(backup: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Rollback {
            backup: backup.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_version(version: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidVersion {
            version: version.into(),
            message: message.to_string(),
        }
    }

    pub fn restore(message: impl ToString) -> Self {
        Self::Restore {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_retryable() {
        assert!(UpdateError::network("connection reset").is_retryable());
        assert!(!UpdateError::Timeout {
            url: "https://example.com".to_string(),
            seconds: 15
        }
        .is_retryable());
        assert!(!UpdateError::merge("conflict").is_retryable());
    }

    #[test]
    fn test_rollback_is_most_severe_and_names_backup() {
        let err = UpdateError::rollback("/var/backups/backup-1.tar.gz", "disk full");
        assert_eq!(err.severity(), Severity::Critical);
        assert!(err.severity() > UpdateError::merge("x").severity());
        assert!(err.to_string().contains("/var/backups/backup-1.tar.gz"));
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(
            UpdateError::ConcurrentUpdate {
                lock: PathBuf::from("/tmp/update.lock")
            }
            .kind()
            .as_str(),
            "concurrent_update"
        );
        assert_eq!(UpdateError::not_found("release").kind(), ErrorKind::NotFound);
        assert_eq!(
            serde_json::to_string(&ErrorKind::PayloadStructure).unwrap(),
            "\"payload_structure\""
        );
    }
}
