//! Status store repositories
//
// PostgreSQL repository and the trait shared with the in-memory store
pub mod file_status;
//
// In-memory store for tests and single-process runs
pub mod memory;

pub use file_status::{create_status_store, FileStatusStore, PgFileStatusStore};
pub use memory::MemoryFileStatusStore;
