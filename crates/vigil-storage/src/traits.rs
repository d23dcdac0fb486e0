//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use async_trait::async_trait;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// The object was located but its body could not be read
    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether the failure happened while reading the object body rather than
    /// talking to the storage service.
    pub fn is_read_failure(&self) -> bool {
        matches!(self, StorageError::ReadFailed(_))
    }
}

impl From<StorageError> for vigil_core::AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => vigil_core::AppError::NotFound(key),
            other => vigil_core::AppError::Storage(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// The scan worker downloads objects through it and the result ingester deletes
/// infected objects through it. Backends are bound to a single bucket (or root directory).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Download an object by its storage key
    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Delete an object by its storage key
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Bucket this backend is bound to, if the backend has buckets
    fn bucket(&self) -> Option<&str> {
        None
    }
}

pub(crate) fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty() || storage_key.contains("..") || storage_key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            storage_key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_keys() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("uploads/abc123").is_ok());
    }

    #[test]
    fn read_failures_are_distinguished() {
        assert!(StorageError::ReadFailed("eof".into()).is_read_failure());
        assert!(!StorageError::DownloadFailed("503".into()).is_read_failure());
    }
}
