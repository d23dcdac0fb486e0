//! Persisted file status
//!
//! The metadata store owns file rows; the scan pipeline reads a file's status by object
//! key and overwrites it with the latest applied scan outcome.

pub mod db;

pub use db::{
    create_status_store, FileStatusStore, MemoryFileStatusStore, PgFileStatusStore,
};
