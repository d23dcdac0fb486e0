//! Operator actions: rescan a failed file, list and count files by status, purge by
//! status, dead-letter replay.

use std::sync::Arc;
use vigil_bus::{MessageBus, OutboundMessage};
use vigil_core::{AppError, FileRecord, FileStats, ScanStatus, UploadEvent};
use vigil_db::FileStatusStore;
use vigil_storage::Storage;

use crate::dead_letter::DeadLetterReconciler;

pub struct AdminService {
    store: Arc<dyn FileStatusStore>,
    storage: Arc<dyn Storage>,
    bus: Arc<dyn MessageBus>,
    upload_channel: String,
    bucket_name: String,
    reconciler: DeadLetterReconciler,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn FileStatusStore>,
        storage: Arc<dyn Storage>,
        bus: Arc<dyn MessageBus>,
        upload_channel: impl Into<String>,
        bucket_name: impl Into<String>,
        reconciler: DeadLetterReconciler,
    ) -> Self {
        Self {
            store,
            storage,
            bus,
            upload_channel: upload_channel.into(),
            bucket_name: bucket_name.into(),
            reconciler,
        }
    }

    /// Replay the dead-letter channel; returns the number of republished events
    pub async fn replay_dead_letters(&self) -> Result<usize, AppError> {
        self.reconciler.replay().await
    }

    /// Reset a file in ERROR to PENDING_SCAN and publish a fresh upload event for it.
    /// If the event cannot be published the file goes back to ERROR.
    #[tracing::instrument(skip(self))]
    pub async fn rescan(&self, object_key: &str) -> Result<FileRecord, AppError> {
        let mut record = self
            .store
            .find_record(object_key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File not found: {}", object_key)))?;

        if record.status != ScanStatus::Error {
            return Err(AppError::InvalidState(format!(
                "File {} has status {}; only files in ERROR can be rescanned",
                object_key, record.status
            )));
        }

        if !self
            .store
            .set_status(object_key, ScanStatus::PendingScan)
            .await?
        {
            return Err(AppError::NotFound(format!("File not found: {}", object_key)));
        }
        record.status = ScanStatus::PendingScan;

        if let Err(e) = self.publish_upload_event(&record).await {
            tracing::error!(error = %e, "Failed to publish rescan event, restoring ERROR status");
            if let Err(restore) = self.store.set_status(object_key, ScanStatus::Error).await {
                tracing::error!(error = %restore, "Failed to restore ERROR status");
            }
            return Err(e);
        }

        tracing::info!(file_id = record.file_id, "File queued for rescan");
        Ok(record)
    }

    async fn publish_upload_event(&self, record: &FileRecord) -> Result<(), AppError> {
        let event = UploadEvent {
            file_id: record.file_id,
            user_id: record.user_id,
            object_key: record.object_key.clone(),
            bucket_name: self.bucket_name.clone(),
            original_file_name: record.original_name.clone(),
        };
        let message = OutboundMessage::json(&self.upload_channel, event.message_key(), &event)?;
        self.bus.publish(message).await?;
        Ok(())
    }

    /// Files currently in `status`
    pub async fn list(&self, status: ScanStatus) -> Result<Vec<FileRecord>, AppError> {
        self.store.list_by_status(status).await
    }

    pub async fn stats(&self) -> Result<FileStats, AppError> {
        self.store.stats().await
    }

    /// Delete every record with `status`. Objects are removed from storage too, except
    /// for INFECTED files whose objects ingestion already deleted.
    #[tracing::instrument(skip(self))]
    pub async fn purge(&self, status: ScanStatus) -> Result<usize, AppError> {
        let deleted = self.store.delete_by_status(status).await?;

        if status != ScanStatus::Infected {
            for record in &deleted {
                if let Err(e) = self.storage.delete(&record.object_key).await {
                    tracing::warn!(
                        object_key = %record.object_key,
                        error = %e,
                        "Failed to delete object during purge"
                    );
                }
            }
        }

        tracing::info!(count = deleted.len(), "Purged file records");
        Ok(deleted.len())
    }
}
