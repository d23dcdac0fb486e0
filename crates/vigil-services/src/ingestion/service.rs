//! Result ingestion: folds scan results into persisted file status.
//!
//! Applying the same result twice leaves the same status. A result for a file with no
//! record is consumed and dropped. Only this service changes status from scan outcomes.

use async_trait::async_trait;
use std::sync::Arc;
use vigil_bus::Record;
use vigil_core::{AppError, HandlerError, ResultStatus, ScanResult, ScanStatus};
use vigil_db::FileStatusStore;
use vigil_storage::Storage;
use vigil_worker::{DeliveryAttempt, MessageHandler, Recoverer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(ScanStatus),
    /// No record exists for the object key
    RecordMissing,
}

pub struct ResultIngestion {
    storage: Arc<dyn Storage>,
    store: Arc<dyn FileStatusStore>,
}

impl ResultIngestion {
    pub fn new(storage: Arc<dyn Storage>, store: Arc<dyn FileStatusStore>) -> Self {
        Self { storage, store }
    }

    /// Apply one scan result.
    ///
    /// INFECTED deletes the object first. A failed delete is logged and the status is set
    /// to INFECTED anyway; there is no later deletion retry.
    #[tracing::instrument(
        skip(self, result),
        fields(object_key = %result.object_key, status = %result.status)
    )]
    pub async fn apply(&self, result: &ScanResult) -> Result<ApplyOutcome, AppError> {
        if result.status == ResultStatus::Infected {
            match self.storage.delete(&result.object_key).await {
                Ok(()) => tracing::info!(
                    virus = result.virus_name.as_deref().unwrap_or("unknown"),
                    "Deleted infected file from storage"
                ),
                Err(e) => tracing::error!(
                    error = %e,
                    "Failed to delete infected file from storage; marking INFECTED anyway"
                ),
            }
        }

        let status = ScanStatus::from(result.status);
        if !self.store.set_status(&result.object_key, status).await? {
            tracing::warn!("No file record for scan result, skipping");
            return Ok(ApplyOutcome::RecordMissing);
        }

        if let Some(message) = result.error_message.as_deref() {
            tracing::warn!(error_message = %message, "File marked ERROR");
        } else {
            tracing::info!("File scan status updated");
        }
        Ok(ApplyOutcome::Applied(status))
    }
}

#[async_trait]
impl MessageHandler<ScanResult> for ResultIngestion {
    async fn handle(
        &self,
        result: &ScanResult,
        _attempt: &DeliveryAttempt,
    ) -> Result<(), HandlerError> {
        match self.apply(result).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_recoverable() => Err(HandlerError::retryable(e)),
            Err(e) => Err(HandlerError::fatal(e)),
        }
    }
}

/// Recoverer for the results channel: logs the result and lets the consumer move on.
/// Results have no dead-letter channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultSkipRecoverer;

#[async_trait]
impl Recoverer<ScanResult> for ResultSkipRecoverer {
    async fn recover(
        &self,
        record: &Record,
        result: Option<&ScanResult>,
        error: &HandlerError,
    ) -> anyhow::Result<()> {
        tracing::error!(
            partition = record.partition,
            offset = record.offset,
            object_key = result.map(|r| r.object_key.as_str()).unwrap_or("<undecodable>"),
            status = ?result.map(|r| r.status),
            error = %error,
            "Dropping scan result after failed delivery"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_db::MemoryFileStatusStore;
    use vigil_storage::MemoryStorage;
    use vigil_worker::BackoffConfig;

    fn setup() -> (ResultIngestion, MemoryStorage, MemoryFileStatusStore) {
        let storage = MemoryStorage::new();
        let store = MemoryFileStatusStore::new();
        let ingestion = ResultIngestion::new(Arc::new(storage.clone()), Arc::new(store.clone()));
        (ingestion, storage, store)
    }

    #[tokio::test]
    async fn clean_result_sets_clean() {
        let (ingestion, storage, store) = setup();
        store.insert(1, "a", "a.txt", ScanStatus::PendingScan);
        storage.set_file("a", b"data".to_vec());

        let outcome = ingestion.apply(&ScanResult::clean("a")).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied(ScanStatus::Clean));
        assert_eq!(store.status_of("a"), Some(ScanStatus::Clean));
        assert!(storage.has_file("a"));
    }

    #[tokio::test]
    async fn infected_result_deletes_object() {
        let (ingestion, storage, store) = setup();
        store.insert(1, "b", "b.exe", ScanStatus::PendingScan);
        storage.set_file("b", b"X5O!P%@AP".to_vec());

        ingestion
            .apply(&ScanResult::infected("b", "EICAR"))
            .await
            .unwrap();
        assert_eq!(store.status_of("b"), Some(ScanStatus::Infected));
        assert!(!storage.has_file("b"));
    }

    #[tokio::test]
    async fn infected_status_survives_delete_failure() {
        let (ingestion, storage, store) = setup();
        store.insert(1, "b", "b.exe", ScanStatus::PendingScan);
        storage.set_file("b", b"X5O!P%@AP".to_vec());
        storage.set_fail_deletes(true);

        let outcome = ingestion
            .apply(&ScanResult::infected("b", "EICAR"))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied(ScanStatus::Infected));
        assert_eq!(store.status_of("b"), Some(ScanStatus::Infected));
        assert!(storage.has_file("b"));
    }

    #[tokio::test]
    async fn applying_twice_is_idempotent() {
        let (ingestion, _storage, store) = setup();
        store.insert(1, "a", "a.txt", ScanStatus::PendingScan);

        let result = ScanResult::error("a", "boom");
        ingestion.apply(&result).await.unwrap();
        let first = store.status_of("a");
        ingestion.apply(&result).await.unwrap();
        assert_eq!(store.status_of("a"), first);
        assert_eq!(first, Some(ScanStatus::Error));
    }

    #[tokio::test]
    async fn missing_record_is_not_an_error() {
        let (ingestion, _storage, _store) = setup();
        let outcome = ingestion.apply(&ScanResult::clean("ghost")).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::RecordMissing);

        let attempt = DeliveryAttempt::first(&BackoffConfig::default());
        assert!(ingestion
            .handle(&ScanResult::clean("ghost"), &attempt)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn persistence_failure_is_retryable() {
        let (ingestion, _storage, store) = setup();
        store.insert(1, "a", "a.txt", ScanStatus::PendingScan);
        store.set_fail_writes(true);

        let attempt = DeliveryAttempt::first(&BackoffConfig::default());
        let err = ingestion
            .handle(&ScanResult::clean("a"), &attempt)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
