//! Shared fixtures for pipeline integration tests: the full pipeline wired on in-memory
//! bus, storage and status store, with a scripted scan engine.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil_bus::{
    decode, MemoryBus, MessageBus, OutboundMessage, Publisher, Record, Subscription,
};
use vigil_core::{FileRecord, HandlerError, ScanResult, ScanStatus, TopicConfig, UploadEvent};
use vigil_db::MemoryFileStatusStore;
use vigil_services::{EngineError, EngineVerdict, Pipeline, ScanEngine};
use vigil_storage::MemoryStorage;
use vigil_worker::{BackoffConfig, DeliveryAttempt, DeliveryOutcome, RetryListener};

pub const UPLOADS: &str = "file-upload-events";
pub const RESULTS: &str = "file-scan-results";
pub const DLT: &str = "file-upload-events-dlt";
pub const SCAN_GROUP: &str = "vigil-scanner";
pub const RESULTS_GROUP: &str = "vigil-results";
pub const BUCKET: &str = "uploads";

/// Engine whose verdict depends on the content: `EICAR` is infected, `GARBLED` is
/// unrecognised, anything else is clean. Can be switched to unavailable.
#[derive(Default)]
pub struct ScriptedEngine {
    unavailable: AtomicBool,
    scans: AtomicUsize,
}

impl ScriptedEngine {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanEngine for ScriptedEngine {
    async fn scan(&self, data: Vec<u8>) -> Result<EngineVerdict, EngineError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable("connection refused".to_string()));
        }
        let text = String::from_utf8_lossy(&data);
        if text.contains("EICAR") {
            Ok(EngineVerdict::Infected(vec!["EICAR".to_string()]))
        } else if text.contains("GARBLED") {
            Ok(EngineVerdict::Unrecognized("stream: ???".to_string()))
        } else {
            Ok(EngineVerdict::Clean)
        }
    }
}

/// Records the ordinal of every failed retryable attempt
#[derive(Default)]
pub struct RecordingListener {
    pub attempts: Mutex<Vec<(i64, u32)>>,
}

impl RetryListener for RecordingListener {
    fn failed_attempt(&self, record: &Record, attempt: &DeliveryAttempt, _error: &HandlerError) {
        self.attempts.lock().push((record.offset, attempt.attempt));
    }
}

pub struct TestPipeline {
    pub bus: MemoryBus,
    pub storage: MemoryStorage,
    pub store: MemoryFileStatusStore,
    pub engine: Arc<ScriptedEngine>,
    pub listener: Arc<RecordingListener>,
    pub pipeline: Pipeline,
}

pub fn topics() -> TopicConfig {
    TopicConfig {
        upload_events: UPLOADS.to_string(),
        scan_results: RESULTS.to_string(),
        upload_events_dlt: DLT.to_string(),
    }
}

pub fn backoff(max_attempts: u32) -> BackoffConfig {
    BackoffConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1000),
        multiplier: 2.0,
        max_delay: Duration::from_millis(10_000),
    }
}

pub fn setup_pipeline(max_attempts: u32) -> TestPipeline {
    let bus = MemoryBus::new();
    let storage = MemoryStorage::new();
    let store = MemoryFileStatusStore::new();
    let engine = Arc::new(ScriptedEngine::default());
    let listener = Arc::new(RecordingListener::default());

    let pipeline = Pipeline::new(
        Arc::new(bus.clone()),
        Arc::new(storage.clone()),
        Arc::new(store.clone()),
        engine.clone(),
        topics(),
        backoff(max_attempts),
    )
    .with_retry_listener(listener.clone());

    TestPipeline {
        bus,
        storage,
        store,
        engine,
        listener,
        pipeline,
    }
}

pub fn upload_event(record: &FileRecord) -> UploadEvent {
    UploadEvent {
        file_id: record.file_id,
        user_id: record.user_id,
        object_key: record.object_key.clone(),
        bucket_name: BUCKET.to_string(),
        original_file_name: record.original_name.clone(),
    }
}

impl TestPipeline {
    /// Simulate the upload path: store the object, create a PENDING_SCAN record and
    /// publish the upload event
    pub async fn upload(&self, key: &str, content: &str) -> UploadEvent {
        self.storage.set_file(key, content.as_bytes().to_vec());
        let record = self
            .store
            .insert(1, key, &format!("{}.bin", key), ScanStatus::PendingScan);
        let event = upload_event(&record);
        self.bus
            .publish(OutboundMessage::json(UPLOADS, event.message_key(), &event).unwrap())
            .await
            .unwrap();
        event
    }

    pub async fn scan_subscription(&self) -> Box<dyn Subscription> {
        self.bus.subscribe(UPLOADS, SCAN_GROUP).await.unwrap()
    }

    pub async fn results_subscription(&self) -> Box<dyn Subscription> {
        self.bus.subscribe(RESULTS, RESULTS_GROUP).await.unwrap()
    }

    /// Consume one upload event through the scan worker
    pub async fn scan_one(&self, subscription: &mut dyn Subscription) -> DeliveryOutcome {
        self.pipeline
            .scan_consumer(SCAN_GROUP)
            .run_once(subscription)
            .await
            .unwrap()
    }

    /// Consume one scan result through the ingester
    pub async fn ingest_one(&self, subscription: &mut dyn Subscription) -> DeliveryOutcome {
        self.pipeline
            .results_consumer(RESULTS_GROUP)
            .run_once(subscription)
            .await
            .unwrap()
    }

    pub fn results(&self) -> Vec<ScanResult> {
        self.bus
            .records(RESULTS)
            .iter()
            .map(|r| decode(&r.payload).unwrap())
            .collect()
    }

    pub fn dead_letters(&self) -> Vec<UploadEvent> {
        self.bus
            .records(DLT)
            .iter()
            .map(|r| decode(&r.payload).unwrap())
            .collect()
    }

    pub fn uploads(&self) -> Vec<UploadEvent> {
        self.bus
            .records(UPLOADS)
            .iter()
            .map(|r| decode(&r.payload).unwrap())
            .collect()
    }
}
