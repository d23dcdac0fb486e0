//! Domain models exchanged over the message bus and persisted by the metadata store.

mod event;
mod file;
mod scan;

pub use event::UploadEvent;
pub use file::{FileRecord, FileStats};
pub use scan::{ResultStatus, ScanResult, ScanStatus};
