//! Explicit wiring of the scan pipeline onto its collaborators

use std::sync::Arc;
use std::time::Duration;
use vigil_bus::MessageBus;
use vigil_core::{ScanResult, TopicConfig, UploadEvent};
use vigil_db::FileStatusStore;
use vigil_storage::Storage;
use vigil_worker::{
    BackoffConfig, ConsumerLoop, LoggingRetryListener, RedeliveryPolicy, RetryListener,
};

use crate::admin::AdminService;
use crate::dead_letter::{DeadLetterReconciler, DeadLetterRecoverer};
use crate::ingestion::{ResultIngestion, ResultSkipRecoverer};
use crate::scan::ScanOrchestrator;
use crate::services::engine::ScanEngine;

/// Collaborators shared by every pipeline component
#[derive(Clone)]
pub struct Pipeline {
    pub bus: Arc<dyn MessageBus>,
    pub storage: Arc<dyn Storage>,
    pub store: Arc<dyn FileStatusStore>,
    pub engine: Arc<dyn ScanEngine>,
    pub topics: TopicConfig,
    pub backoff: BackoffConfig,
    pub retry_listener: Arc<dyn RetryListener>,
}

impl Pipeline {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        storage: Arc<dyn Storage>,
        store: Arc<dyn FileStatusStore>,
        engine: Arc<dyn ScanEngine>,
        topics: TopicConfig,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            bus,
            storage,
            store,
            engine,
            topics,
            backoff,
            retry_listener: Arc::new(LoggingRetryListener),
        }
    }

    pub fn with_retry_listener(mut self, listener: Arc<dyn RetryListener>) -> Self {
        self.retry_listener = listener;
        self
    }

    fn policy(&self) -> RedeliveryPolicy {
        RedeliveryPolicy::new(self.backoff).with_listener(self.retry_listener.clone())
    }

    pub fn orchestrator(&self) -> ScanOrchestrator {
        ScanOrchestrator::new(
            self.storage.clone(),
            self.engine.clone(),
            self.bus.clone(),
            &self.topics.scan_results,
        )
    }

    pub fn ingestion(&self) -> ResultIngestion {
        ResultIngestion::new(self.storage.clone(), self.store.clone())
    }

    /// Consumer of the upload channel; exhausted events go to the dead-letter channel
    pub fn scan_consumer(&self, group: &str) -> ConsumerLoop<UploadEvent> {
        ConsumerLoop::new(
            "scan-worker",
            self.bus.clone(),
            &self.topics.upload_events,
            group,
            self.policy(),
            Arc::new(self.orchestrator()),
            Arc::new(DeadLetterRecoverer::new(
                self.bus.clone(),
                &self.topics.scan_results,
                &self.topics.upload_events_dlt,
            )),
        )
    }

    /// Consumer of the results channel; exhausted results are logged and dropped
    pub fn results_consumer(&self, group: &str) -> ConsumerLoop<ScanResult> {
        ConsumerLoop::new(
            "result-ingester",
            self.bus.clone(),
            &self.topics.scan_results,
            group,
            self.policy(),
            Arc::new(self.ingestion()),
            Arc::new(ResultSkipRecoverer),
        )
    }

    pub fn reconciler(&self, poll_timeout: Duration) -> DeadLetterReconciler {
        DeadLetterReconciler::new(
            self.bus.clone(),
            self.store.clone(),
            &self.topics.upload_events_dlt,
            &self.topics.upload_events,
            poll_timeout,
        )
    }

    pub fn admin(&self, bucket_name: &str, poll_timeout: Duration) -> AdminService {
        AdminService::new(
            self.store.clone(),
            self.storage.clone(),
            self.bus.clone(),
            &self.topics.upload_events,
            bucket_name,
            self.reconciler(poll_timeout),
        )
    }
}
