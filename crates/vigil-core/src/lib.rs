//! Vigil Core Library
//!
//! This crate provides the domain models, error types and configuration shared by
//! every vigil component: the scan worker, the result ingester and the admin tooling.

pub mod backends;
pub mod config;
pub mod constants;
pub mod error;
pub mod handler_error;
pub mod models;

// Re-export commonly used types
pub use backends::{BusBackend, StatusStoreBackend, StorageBackend};
pub use config::{BusConfig, ClamAvConfig, Config, RetrySettings, StorageConfig, TopicConfig};
pub use error::AppError;
pub use handler_error::{HandlerError, HandlerResultExt};
pub use models::{FileRecord, FileStats, ResultStatus, ScanResult, ScanStatus, UploadEvent};
