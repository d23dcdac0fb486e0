//! Scan orchestration: fetch an uploaded object, scan it, publish the outcome.
//!
//! Every completed invocation publishes exactly one [`ScanResult`]. Storage and engine
//! failures surface as retryable errors and publish nothing; the redelivery policy decides
//! what happens next. The orchestrator never touches persisted status.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use vigil_bus::{MessageBus, OutboundMessage};
use vigil_core::constants::{CLAMAV_UNKNOWN_RESULT, S3_READ_FAILED, S3_SERVICE_UNAVAILABLE};
use vigil_core::{HandlerError, HandlerResultExt, ScanResult, UploadEvent};
use vigil_storage::{Storage, StorageError};
use vigil_worker::{DeliveryAttempt, MessageHandler};

use crate::services::engine::{EngineVerdict, ScanEngine};

pub struct ScanOrchestrator {
    storage: Arc<dyn Storage>,
    engine: Arc<dyn ScanEngine>,
    bus: Arc<dyn MessageBus>,
    results_channel: String,
}

impl ScanOrchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        engine: Arc<dyn ScanEngine>,
        bus: Arc<dyn MessageBus>,
        results_channel: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            engine,
            bus,
            results_channel: results_channel.into(),
        }
    }

    /// Fetch and scan the object named by `event`, classifying the outcome
    #[tracing::instrument(
        skip(self, event),
        fields(object_key = %event.object_key, file_id = event.file_id)
    )]
    pub async fn scan(&self, event: &UploadEvent) -> Result<ScanResult, HandlerError> {
        if let Some(bucket) = self.storage.bucket() {
            if bucket != event.bucket_name {
                tracing::warn!(
                    event_bucket = %event.bucket_name,
                    configured_bucket = %bucket,
                    "Upload event names a different bucket; reading from the configured one"
                );
            }
        }

        let start = Instant::now();
        let data = self
            .storage
            .download(&event.object_key)
            .await
            .map_err(classify_storage_error)?;

        let verdict = self
            .engine
            .scan(data)
            .await
            .map_err(HandlerError::retryable)?;

        let result = match &verdict {
            EngineVerdict::Clean => ScanResult::clean(&event.object_key),
            EngineVerdict::Infected(_) => {
                let virus = verdict.primary_match().unwrap_or("unknown");
                tracing::warn!(virus = %virus, "Infected file detected");
                ScanResult::infected(&event.object_key, virus)
            }
            EngineVerdict::Unrecognized(raw) => {
                tracing::error!(response = %raw, "Scan engine returned an unrecognized result");
                ScanResult::error(&event.object_key, CLAMAV_UNKNOWN_RESULT)
            }
        }
        .with_file_id(event.file_id);

        tracing::info!(
            status = %result.status,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Scan completed"
        );
        Ok(result)
    }

    /// Publish `result` on the results channel, keyed by object key
    pub async fn publish_result(&self, result: &ScanResult) -> Result<(), HandlerError> {
        let message =
            OutboundMessage::json(&self.results_channel, &result.object_key, result).fatal()?;
        self.bus
            .publish(message)
            .await
            .map_err(HandlerError::retryable)
    }
}

/// Every fetch failure is retried, a missing object included. Body read failures are
/// reported as such; everything else counts as the store being unavailable.
fn classify_storage_error(err: StorageError) -> HandlerError {
    let prefix = if err.is_read_failure() {
        S3_READ_FAILED
    } else {
        S3_SERVICE_UNAVAILABLE
    };
    HandlerError::retryable(anyhow::anyhow!("{}: {}", prefix, err))
}

#[async_trait]
impl MessageHandler<UploadEvent> for ScanOrchestrator {
    async fn handle(
        &self,
        event: &UploadEvent,
        attempt: &DeliveryAttempt,
    ) -> Result<(), HandlerError> {
        tracing::debug!(
            object_key = %event.object_key,
            attempt = attempt.attempt,
            max_attempts = attempt.max_attempts,
            "Handling upload event"
        );
        let result = self.scan(event).await?;
        self.publish_result(&result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::engine::EngineError;
    use parking_lot::Mutex;
    use vigil_core::constants::CLAMAV_UNAVAILABLE;
    use std::collections::VecDeque;
    use vigil_bus::{decode, MemoryBus};
    use vigil_core::ResultStatus;
    use vigil_storage::MemoryStorage;
    use vigil_worker::BackoffConfig;

    struct QueuedEngine {
        verdicts: Mutex<VecDeque<Result<EngineVerdict, EngineError>>>,
    }

    impl QueuedEngine {
        fn new(verdicts: Vec<Result<EngineVerdict, EngineError>>) -> Arc<Self> {
            Arc::new(Self {
                verdicts: Mutex::new(verdicts.into()),
            })
        }
    }

    #[async_trait]
    impl ScanEngine for QueuedEngine {
        async fn scan(&self, _data: Vec<u8>) -> Result<EngineVerdict, EngineError> {
            self.verdicts
                .lock()
                .pop_front()
                .unwrap_or(Ok(EngineVerdict::Clean))
        }
    }

    fn event(key: &str) -> UploadEvent {
        UploadEvent {
            file_id: 7,
            user_id: 1,
            object_key: key.to_string(),
            bucket_name: "uploads".to_string(),
            original_file_name: "doc.pdf".to_string(),
        }
    }

    fn setup(
        verdicts: Vec<Result<EngineVerdict, EngineError>>,
    ) -> (ScanOrchestrator, MemoryStorage, MemoryBus) {
        let storage = MemoryStorage::new();
        let bus = MemoryBus::new();
        let orchestrator = ScanOrchestrator::new(
            Arc::new(storage.clone()),
            QueuedEngine::new(verdicts),
            Arc::new(bus.clone()),
            "results",
        );
        (orchestrator, storage, bus)
    }

    fn attempt() -> DeliveryAttempt {
        DeliveryAttempt::first(&BackoffConfig::default())
    }

    fn published(bus: &MemoryBus) -> Vec<ScanResult> {
        bus.records("results")
            .iter()
            .map(|r| decode::<ScanResult>(&r.payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn clean_file_publishes_clean_result() {
        let (orchestrator, storage, bus) = setup(vec![Ok(EngineVerdict::Clean)]);
        storage.set_file("a", b"hello".to_vec());

        orchestrator.handle(&event("a"), &attempt()).await.unwrap();

        let results = published(&bus);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].object_key, "a");
        assert_eq!(results[0].status, ResultStatus::Clean);
        assert_eq!(results[0].file_id, Some(7));
        assert_eq!(bus.records("results")[0].key.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn infected_file_reports_first_match() {
        let (orchestrator, storage, bus) = setup(vec![Ok(EngineVerdict::Infected(vec![
            "EICAR".to_string(),
            "Other".to_string(),
        ]))]);
        storage.set_file("b", b"X5O!P%@AP".to_vec());

        orchestrator.handle(&event("b"), &attempt()).await.unwrap();

        let results = published(&bus);
        assert_eq!(results[0].status, ResultStatus::Infected);
        assert_eq!(results[0].virus_name.as_deref(), Some("EICAR"));
        assert!(results[0].error_message.is_none());
    }

    #[tokio::test]
    async fn unrecognized_verdict_is_an_error_result_not_a_failure() {
        let (orchestrator, storage, bus) =
            setup(vec![Ok(EngineVerdict::Unrecognized("???".to_string()))]);
        storage.set_file("c", b"data".to_vec());

        orchestrator.handle(&event("c"), &attempt()).await.unwrap();

        let results = published(&bus);
        assert_eq!(results[0].status, ResultStatus::Error);
        assert_eq!(results[0].error_message.as_deref(), Some(CLAMAV_UNKNOWN_RESULT));
    }

    #[tokio::test]
    async fn engine_unavailable_is_retryable_and_publishes_nothing() {
        let (orchestrator, storage, bus) =
            setup(vec![Err(EngineError::Unavailable("refused".to_string()))]);
        storage.set_file("d", b"data".to_vec());

        let err = orchestrator
            .handle(&event("d"), &attempt())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with(CLAMAV_UNAVAILABLE));
        assert!(bus.records("results").is_empty());
    }

    #[tokio::test]
    async fn read_failure_is_retryable() {
        let (orchestrator, storage, bus) = setup(vec![]);
        storage.set_file("e", b"data".to_vec());
        storage.fail_next_reads(1);

        let err = orchestrator
            .handle(&event("e"), &attempt())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains(S3_READ_FAILED));
        assert!(bus.records("results").is_empty());
    }

    #[tokio::test]
    async fn missing_object_is_retryable() {
        let (orchestrator, _storage, bus) = setup(vec![]);

        let err = orchestrator
            .handle(&event("gone"), &attempt())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains(S3_SERVICE_UNAVAILABLE));
        assert!(bus.records("results").is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_retryable() {
        let (orchestrator, storage, bus) = setup(vec![Ok(EngineVerdict::Clean)]);
        storage.set_file("f", b"data".to_vec());
        bus.set_fail_publishes("results", true);

        let err = orchestrator
            .handle(&event("f"), &attempt())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
