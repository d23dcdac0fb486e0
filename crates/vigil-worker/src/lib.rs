//! Message consumption with bounded redelivery
//!
//! A [`ConsumerLoop`] pulls records from one channel, decodes them, and runs the
//! [`RedeliveryPolicy`] around a [`MessageHandler`]. Retryable failures are redelivered
//! with exponential backoff up to `max_attempts`; exhausted or fatal messages go to a
//! [`Recoverer`]. The record's offset is committed only once it was handled or recovered.

pub mod backoff;
pub mod consumer;
pub mod handler;
pub mod policy;

pub use backoff::{BackoffConfig, DeliveryAttempt};
pub use consumer::ConsumerLoop;
pub use handler::{LoggingRetryListener, MessageHandler, Recoverer, RetryListener};
pub use policy::{DeliveryOutcome, RedeliveryPolicy};
