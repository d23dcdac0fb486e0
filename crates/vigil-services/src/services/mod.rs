#[cfg(feature = "clamav")]
pub mod clamav;
pub mod engine;

#[cfg(feature = "clamav")]
pub use clamav::ClamAVService;
pub use engine::{EngineError, EngineVerdict, ScanEngine};
