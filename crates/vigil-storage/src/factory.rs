#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{MemoryStorage, Storage, StorageBackend, StorageError, StorageResult};
use std::sync::Arc;
use vigil_core::StorageConfig;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;

            let storage = S3Storage::new(bucket, region, config.s3_endpoint.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;

            let storage = LocalStorage::new(base_path).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageBackend::Memory => {
            tracing::warn!("Using in-memory object storage; objects are lost on exit");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: StorageBackend) -> StorageConfig {
        StorageConfig {
            backend,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            local_storage_path: None,
        }
    }

    #[tokio::test]
    async fn memory_backend_needs_no_settings() {
        let storage = create_storage(&config(StorageBackend::Memory)).await.unwrap();
        assert!(storage.bucket().is_none());
        let err = storage.download("uploads/a").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[cfg(feature = "storage-s3")]
    #[tokio::test]
    async fn s3_without_bucket_is_a_config_error() {
        let err = create_storage(&config(StorageBackend::S3)).await.err().unwrap();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn local_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(StorageBackend::Local);
        cfg.local_storage_path = Some(dir.path().to_string_lossy().into_owned());

        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let storage = create_storage(&cfg).await.unwrap();
        assert_eq!(storage.download("a.txt").await.unwrap(), b"hello");
    }
}
