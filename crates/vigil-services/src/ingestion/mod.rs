pub mod service;

pub use service::{ApplyOutcome, ResultIngestion, ResultSkipRecoverer};
