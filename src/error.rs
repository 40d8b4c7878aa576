//! Error types for the artifact store.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
///
/// Raised by the low-level layers (hashing, path resolution, sharded layout).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Path escapes root {root:?}: {path}")]
    PathEscape { root: PathBuf, path: String },

    #[error("Shard directory is not writable: {0:?}")]
    ShardNotWritable(PathBuf),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    /// Wrap an I/O error with the path it happened on.
    pub(crate) fn io_at(path: &std::path::Path, action: &str, err: std::io::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            err.kind(),
            format!("Failed to {} {:?}: {}", action, path, err),
        ))
    }
}

/// Repository-level errors surfaced by [`crate::repository::ContentRepository`].
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    #[error("Archive not found: {0}")]
    ArchiveNotFound(String),

    #[error("Not an archive: {0}")]
    NotAnArchive(String),

    #[error("Content {0} is not exploded")]
    NotExploded(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error("Timed out after {waited:?} waiting for lock on {hash}")]
    LockTimeout { hash: String, waited: Duration },

    #[error("Repository is read-only")]
    ReadOnly,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::StorageError(StorageError::IoError(err))
    }
}

impl From<config::ConfigError> for RepositoryError {
    fn from(err: config::ConfigError) -> Self {
        RepositoryError::ConfigError(err.to_string())
    }
}

impl RepositoryError {
    /// Whether the caller may reasonably retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::LockTimeout { .. })
    }
}
