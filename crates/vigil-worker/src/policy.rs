use crate::{
    BackoffConfig, DeliveryAttempt, LoggingRetryListener, MessageHandler, Recoverer,
    RetryListener,
};
use std::sync::Arc;
use vigil_bus::Record;
use vigil_core::HandlerError;

/// What happened to a message after the policy ran
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The handler succeeded on attempt `attempts`
    Handled { attempts: u32 },
    /// The handler gave up after `attempts` and the recoverer took the message
    Recovered { attempts: u32 },
    /// The recoverer failed too; the record must not be committed
    RecoveryFailed {
        attempts: u32,
        error: anyhow::Error,
    },
}

impl DeliveryOutcome {
    /// Whether the record's offset may be committed
    pub fn is_settled(&self) -> bool {
        !matches!(self, DeliveryOutcome::RecoveryFailed { .. })
    }
}

/// Bounded exponential-backoff redelivery around a message handler.
///
/// Attempt `k + 1` starts only after attempt `k` failed and its delay elapsed. Fatal
/// errors skip the remaining attempts.
#[derive(Clone)]
pub struct RedeliveryPolicy {
    backoff: BackoffConfig,
    listener: Arc<dyn RetryListener>,
}

impl RedeliveryPolicy {
    pub fn new(backoff: BackoffConfig) -> Self {
        Self {
            backoff,
            listener: Arc::new(LoggingRetryListener),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn RetryListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    pub async fn process<M, H, R>(
        &self,
        record: &Record,
        message: &M,
        handler: &H,
        recoverer: &R,
    ) -> DeliveryOutcome
    where
        M: Send + Sync,
        H: MessageHandler<M> + ?Sized,
        R: Recoverer<M> + ?Sized,
    {
        let mut attempt = DeliveryAttempt::first(&self.backoff);
        let error = loop {
            let err = match handler.handle(message, &attempt).await {
                Ok(()) => {
                    if attempt.attempt > 1 {
                        tracing::info!(
                            channel = %record.channel,
                            partition = record.partition,
                            offset = record.offset,
                            attempt = attempt.attempt,
                            "Message handled after retry"
                        );
                    }
                    return DeliveryOutcome::Handled {
                        attempts: attempt.attempt,
                    };
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                tracing::error!(
                    channel = %record.channel,
                    partition = record.partition,
                    offset = record.offset,
                    attempt = attempt.attempt,
                    error = %err,
                    "Non-retryable failure, skipping remaining attempts"
                );
                break err;
            }

            self.listener.failed_attempt(record, &attempt, &err);

            match (attempt.next_delay, attempt.advance(&self.backoff)) {
                (Some(delay), Some(next)) => {
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                _ => break err,
            }
        };

        self.recover(record, Some(message), &error, attempt.attempt, recoverer)
            .await
    }

    /// Hand a message straight to the recoverer, e.g. when it could not be decoded
    pub async fn recover<M, R>(
        &self,
        record: &Record,
        message: Option<&M>,
        error: &HandlerError,
        attempts: u32,
        recoverer: &R,
    ) -> DeliveryOutcome
    where
        M: Send + Sync,
        R: Recoverer<M> + ?Sized,
    {
        match recoverer.recover(record, message, error).await {
            Ok(()) => DeliveryOutcome::Recovered { attempts },
            Err(e) => {
                tracing::error!(
                    channel = %record.channel,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Recovery failed"
                );
                DeliveryOutcome::RecoveryFailed { attempts, error: e }
            }
        }
    }
}
