use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use vigil_core::{AppError, FileRecord, FileStats, ScanStatus};

use super::FileStatusStore;

/// In-memory file status store keyed by object key
#[derive(Clone, Default)]
pub struct MemoryFileStatusStore {
    records: Arc<Mutex<BTreeMap<String, FileRecord>>>,
    next_id: Arc<AtomicI64>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryFileStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, assigning the next file id
    pub fn insert(
        &self,
        user_id: i64,
        object_key: &str,
        original_name: &str,
        status: ScanStatus,
    ) -> FileRecord {
        let file_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = FileRecord {
            file_id,
            user_id,
            object_key: object_key.to_string(),
            original_name: original_name.to_string(),
            status,
        };
        self.records
            .lock()
            .insert(object_key.to_string(), record.clone());
        record
    }

    pub fn remove(&self, object_key: &str) -> Option<FileRecord> {
        self.records.lock().remove(object_key)
    }

    /// Status snapshot, bypassing the async trait
    pub fn status_of(&self, object_key: &str) -> Option<ScanStatus> {
        self.records.lock().get(object_key).map(|r| r.status)
    }

    /// Make status updates fail with a database error until reset
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

#[async_trait::async_trait]
impl FileStatusStore for MemoryFileStatusStore {
    async fn find_status(&self, object_key: &str) -> Result<Option<ScanStatus>, AppError> {
        Ok(self.status_of(object_key))
    }

    async fn find_record(&self, object_key: &str) -> Result<Option<FileRecord>, AppError> {
        Ok(self.records.lock().get(object_key).cloned())
    }

    async fn set_status(&self, object_key: &str, status: ScanStatus) -> Result<bool, AppError> {
        if *self.fail_writes.lock() {
            return Err(AppError::Internal(format!(
                "status write rejected for {}",
                object_key
            )));
        }
        match self.records.lock().get_mut(object_key) {
            Some(record) => {
                record.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn stats(&self) -> Result<FileStats, AppError> {
        let mut stats = FileStats::default();
        for record in self.records.lock().values() {
            match record.status {
                ScanStatus::PendingScan => stats.pending += 1,
                ScanStatus::Clean => stats.clean += 1,
                ScanStatus::Infected => stats.infected += 1,
                ScanStatus::Error => stats.error += 1,
            }
            stats.total += 1;
        }
        Ok(stats)
    }

    async fn list_by_status(&self, status: ScanStatus) -> Result<Vec<FileRecord>, AppError> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn delete_by_status(&self, status: ScanStatus) -> Result<Vec<FileRecord>, AppError> {
        let mut records = self.records.lock();
        let keys: Vec<String> = records
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(k, _)| k.clone())
            .collect();
        Ok(keys.iter().filter_map(|k| records.remove(k)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_status_on_missing_record_reports_absent() {
        let store = MemoryFileStatusStore::new();
        assert!(!store.set_status("missing", ScanStatus::Clean).await.unwrap());
        assert_eq!(store.find_status("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn stats_count_each_status() {
        let store = MemoryFileStatusStore::new();
        store.insert(1, "a", "a.txt", ScanStatus::PendingScan);
        store.insert(1, "b", "b.txt", ScanStatus::Clean);
        store.insert(2, "c", "c.txt", ScanStatus::Error);
        store.insert(2, "d", "d.txt", ScanStatus::Error);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.clean, 1);
        assert_eq!(stats.infected, 0);
        assert_eq!(stats.error, 2);
        assert_eq!(stats.total, 4);
    }

    #[tokio::test]
    async fn delete_by_status_returns_removed_records() {
        let store = MemoryFileStatusStore::new();
        store.insert(1, "a", "a.txt", ScanStatus::Error);
        store.insert(1, "b", "b.txt", ScanStatus::Clean);

        let deleted = store.delete_by_status(ScanStatus::Error).await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].object_key, "a");
        assert!(store.find_record("a").await.unwrap().is_none());
        assert!(store.find_record("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failing_writes_surface_as_errors() {
        let store = MemoryFileStatusStore::new();
        store.insert(1, "a", "a.txt", ScanStatus::PendingScan);
        store.set_fail_writes(true);

        let err = store.set_status("a", ScanStatus::Clean).await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(store.status_of("a"), Some(ScanStatus::PendingScan));
    }
}
