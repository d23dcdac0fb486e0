//! Dead-letter handling for upload events: routing exhausted events to the dead-letter
//! channel, and replaying the ones whose files are still in ERROR.

pub mod reconciler;
pub mod recoverer;

pub use reconciler::{DeadLetterReconciler, ReplaySummary};
pub use recoverer::DeadLetterRecoverer;
