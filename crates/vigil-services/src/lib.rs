//! Vigil Services Layer
//!
//! Hosts the scan pipeline's services: the scan orchestrator and its dead-letter
//! recoverer, result ingestion, dead-letter reconciliation and the admin operations.
//! [`Pipeline`] wires them onto consumer loops; binaries only supply configuration.

pub mod admin;
pub mod dead_letter;
pub mod ingestion;
pub mod pipeline;
pub mod scan;
pub mod services;

pub use admin::AdminService;
pub use dead_letter::{DeadLetterReconciler, DeadLetterRecoverer, ReplaySummary};
pub use ingestion::{ApplyOutcome, ResultIngestion, ResultSkipRecoverer};
pub use pipeline::Pipeline;
pub use scan::ScanOrchestrator;
#[cfg(feature = "clamav")]
pub use services::clamav::ClamAVService;
pub use services::engine::{EngineError, EngineVerdict, ScanEngine};
pub use vigil_storage::{create_storage, Storage, StorageError, StorageResult};
