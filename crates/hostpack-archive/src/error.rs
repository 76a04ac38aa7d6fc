//! Error types for archive, walk and merge operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using hostpack-archive's error type
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Errors raised while walking, archiving, extracting or merging trees
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The root of a walk cannot be read
    #[error("Cannot read root directory {path}: {source}")]
    RootUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Filesystem operation failed
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Archive could not be written
    #[error("Failed to write archive {path}: {message}")]
    Write { path: PathBuf, message: String },

    /// Archive could not be read or decoded
    #[error("Archive {path} is corrupt or unreadable: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// Archive extension not recognized
    #[error("Unsupported archive format: {path} (expected .zip, .tar.gz or .tgz)")]
    UnsupportedFormat { path: PathBuf },

    /// Archive source label is unusable
    #[error("Invalid archive label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    /// Two sources produced the same archive path
    #[error("Duplicate archive entry: {path}")]
    DuplicateEntry { path: String },

    /// A destination path has the wrong type for the incoming entry
    #[error("Cannot merge {path}: {reason}")]
    Conflict { path: PathBuf, reason: String },

    /// No marker file identifies the payload root
    #[error("No marker file ({markers}) found within {depth} levels of {root}")]
    PayloadStructure {
        root: PathBuf,
        markers: String,
        depth: usize,
    },
}

impl ArchiveError {
    /// Create an I/O error bound to a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a write error
    pub fn write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a corrupt archive error
    pub fn corrupt(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid label error
    pub fn invalid_label(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLabel {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// Create a merge conflict error
    pub fn conflict(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
