use crate::traits::{validate_key, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory object storage.
///
/// Used by tests and by the `memory` backend for local runs. Reads and deletes can be made
/// to fail on demand so callers can exercise their error paths.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_reads: Arc<AtomicUsize>,
    fail_deletes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly
    pub fn set_file(&self, key: &str, data: impl Into<Vec<u8>>) {
        self.objects.lock().insert(key.to_string(), data.into());
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Make the next `count` downloads fail with a read error
    pub fn fail_next_reads(&self, count: usize) {
        self.fail_reads.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        validate_key(storage_key)?;

        let pending = self
            .fail_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(StorageError::ReadFailed(format!(
                "injected read failure for {}",
                storage_key
            )));
        }

        self.objects
            .lock()
            .get(storage_key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        validate_key(storage_key)?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::DeleteFailed(format!(
                "injected delete failure for {}",
                storage_key
            )));
        }
        self.objects.lock().remove(storage_key);
        Ok(())
    }
}
