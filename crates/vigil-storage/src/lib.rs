//! Vigil Storage Library
//!
//! This crate provides the object storage abstraction used by the scan pipeline:
//! fetch an uploaded object by key and delete it once it is found infected.
//! Implementations exist for S3-compatible stores, the local filesystem and memory.
//!
//! Keys are opaque to this crate. They must not contain `..` or a leading `/`.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
pub use vigil_core::StorageBackend;
