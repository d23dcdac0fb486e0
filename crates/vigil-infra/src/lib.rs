//! Vigil Infrastructure Library
//!
//! Process-level plumbing shared by the worker binaries:
//! - Telemetry initialization (tracing subscriber, plain or JSON output)
//! - Shutdown signal handling

pub mod shutdown;
pub mod telemetry;

pub use shutdown::{shutdown_channel, shutdown_signal};
pub use telemetry::{init_telemetry, shutdown_telemetry};
