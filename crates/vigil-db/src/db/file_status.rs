//! File status repository: reads and updates scan_status on the file_metadata table.

use sqlx::{PgPool, Postgres};
use std::sync::Arc;
use vigil_core::{AppError, FileRecord, FileStats, ScanStatus, StatusStoreBackend};

use super::MemoryFileStatusStore;

const RECORD_COLUMNS: &str =
    "id AS file_id, user_id, unique_name AS object_key, original_name, scan_status AS status";

/// Trait for file status operations.
/// Abstracts the metadata store so services can run against PostgreSQL or memory.
#[async_trait::async_trait]
pub trait FileStatusStore: Send + Sync {
    /// Current status for `object_key`, `None` when no record exists
    async fn find_status(&self, object_key: &str) -> Result<Option<ScanStatus>, AppError>;

    async fn find_record(&self, object_key: &str) -> Result<Option<FileRecord>, AppError>;

    /// Overwrite the status. Returns `false` when no record exists for `object_key`.
    async fn set_status(&self, object_key: &str, status: ScanStatus) -> Result<bool, AppError>;

    async fn stats(&self) -> Result<FileStats, AppError>;

    async fn list_by_status(&self, status: ScanStatus) -> Result<Vec<FileRecord>, AppError>;

    /// Delete every record with `status` and return the deleted records
    async fn delete_by_status(&self, status: ScanStatus) -> Result<Vec<FileRecord>, AppError>;
}

/// PostgreSQL implementation of [`FileStatusStore`]
#[derive(Clone)]
pub struct PgFileStatusStore {
    pool: PgPool,
}

impl PgFileStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FileStatusStore for PgFileStatusStore {
    #[tracing::instrument(skip(self), fields(db.table = "file_metadata"))]
    async fn find_status(&self, object_key: &str) -> Result<Option<ScanStatus>, AppError> {
        let status: Option<ScanStatus> = sqlx::query_scalar::<Postgres, ScanStatus>(
            "SELECT scan_status FROM file_metadata WHERE unique_name = $1",
        )
        .bind(object_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_metadata"))]
    async fn find_record(&self, object_key: &str) -> Result<Option<FileRecord>, AppError> {
        let record: Option<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {} FROM file_metadata WHERE unique_name = $1",
            RECORD_COLUMNS
        ))
        .bind(object_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_metadata", status = %status))]
    async fn set_status(&self, object_key: &str, status: ScanStatus) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE file_metadata
            SET scan_status = $2, updated_at = NOW()
            WHERE unique_name = $1
            "#,
        )
        .bind(object_key)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_metadata"))]
    async fn stats(&self) -> Result<FileStats, AppError> {
        let rows: Vec<(ScanStatus, i64)> = sqlx::query_as::<Postgres, (ScanStatus, i64)>(
            "SELECT scan_status, COUNT(*) FROM file_metadata GROUP BY scan_status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = FileStats::default();
        for (status, count) in rows {
            match status {
                ScanStatus::PendingScan => stats.pending = count,
                ScanStatus::Clean => stats.clean = count,
                ScanStatus::Infected => stats.infected = count,
                ScanStatus::Error => stats.error = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_metadata", status = %status))]
    async fn list_by_status(&self, status: ScanStatus) -> Result<Vec<FileRecord>, AppError> {
        let records: Vec<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {} FROM file_metadata WHERE scan_status = $1 ORDER BY id",
            RECORD_COLUMNS
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_metadata", status = %status))]
    async fn delete_by_status(&self, status: ScanStatus) -> Result<Vec<FileRecord>, AppError> {
        let records: Vec<FileRecord> = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "DELETE FROM file_metadata WHERE scan_status = $1 RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        tracing::info!(status = %status, deleted = records.len(), "Deleted file records");
        Ok(records)
    }
}

/// Create the status store selected by `STATUS_STORE`
pub fn create_status_store(
    backend: StatusStoreBackend,
    pool: Option<PgPool>,
) -> Result<Arc<dyn FileStatusStore>, AppError> {
    match backend {
        StatusStoreBackend::Postgres => {
            let pool = pool.ok_or_else(|| {
                AppError::InvalidInput(
                    "PostgreSQL status store requires a database pool".to_string(),
                )
            })?;
            tracing::info!("Initializing PostgreSQL file status store");
            Ok(Arc::new(PgFileStatusStore::new(pool)))
        }
        StatusStoreBackend::Memory => {
            tracing::warn!("Using in-memory file status store; statuses are lost on exit");
            Ok(Arc::new(MemoryFileStatusStore::new()))
        }
    }
}
