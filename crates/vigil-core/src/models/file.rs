use serde::{Deserialize, Serialize};

use super::ScanStatus;

/// File metadata as seen by the scan pipeline.
///
/// The metadata store owns these rows; the pipeline only reads them and updates `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FileRecord {
    pub file_id: i64,
    pub user_id: i64,
    pub object_key: String,
    pub original_name: String,
    pub status: ScanStatus,
}

/// Per-status file counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    pub pending: i64,
    pub clean: i64,
    pub infected: i64,
    pub error: i64,
    pub total: i64,
}

impl FileStats {
    pub fn count(&self, status: ScanStatus) -> i64 {
        match status {
            ScanStatus::PendingScan => self.pending,
            ScanStatus::Clean => self.clean,
            ScanStatus::Infected => self.infected,
            ScanStatus::Error => self.error,
        }
    }
}
