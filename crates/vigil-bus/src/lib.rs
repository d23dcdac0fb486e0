//! Vigil Bus Library
//!
//! Message transport used between the upload path, the scan worker and the result
//! ingester. The transport is a partitioned, at-least-once log: records carry their
//! channel, partition and offset, and consumers commit offsets after handling.
//!
//! Two backends exist: Kafka (`kafka` feature, via `rdkafka`) and an in-process
//! partitioned log for tests and single-process runs.

pub mod codec;
pub mod error;
pub mod factory;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use bytes::Bytes;
pub use codec::{decode, encode};
pub use error::{BusError, BusResult};
pub use factory::create_bus;
#[cfg(feature = "kafka")]
pub use kafka::KafkaBus;
pub use memory::MemoryBus;
pub use traits::{MessageBus, OutboundMessage, Publisher, Record, ReplayReader, Subscription};
pub use vigil_core::BusBackend;
