//! Seams between the redelivery policy and the services it drives

use crate::DeliveryAttempt;
use async_trait::async_trait;
use vigil_bus::Record;
use vigil_core::HandlerError;

/// Processes one decoded message
#[async_trait]
pub trait MessageHandler<M: Send + Sync>: Send + Sync {
    async fn handle(&self, message: &M, attempt: &DeliveryAttempt) -> Result<(), HandlerError>;
}

/// Takes over a message the handler could not process.
///
/// Called once attempts are exhausted, on a fatal handler error, or when the payload could
/// not be decoded (`message` is `None`). An `Err` leaves the record uncommitted and the
/// recovery is tried again.
#[async_trait]
pub trait Recoverer<M: Send + Sync>: Send + Sync {
    async fn recover(
        &self,
        record: &Record,
        message: Option<&M>,
        error: &HandlerError,
    ) -> anyhow::Result<()>;
}

/// Observes every failed retryable attempt
pub trait RetryListener: Send + Sync {
    fn failed_attempt(&self, record: &Record, attempt: &DeliveryAttempt, error: &HandlerError);
}

/// Default listener: one warning per failed attempt
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingRetryListener;

impl RetryListener for LoggingRetryListener {
    fn failed_attempt(&self, record: &Record, attempt: &DeliveryAttempt, error: &HandlerError) {
        tracing::warn!(
            channel = %record.channel,
            partition = record.partition,
            offset = record.offset,
            attempt = attempt.attempt,
            max_attempts = attempt.max_attempts,
            error = %error,
            "Retry attempt {}/{}",
            attempt.attempt,
            attempt.max_attempts
        );
    }
}
