use std::sync::Arc;
use std::time::Duration;
use vigil_bus::{decode, MessageBus, OutboundMessage};
use vigil_core::{AppError, ScanStatus, UploadEvent};
use vigil_db::FileStatusStore;

/// Totals of one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub retried: usize,
    pub skipped: usize,
}

/// On-demand replay of the upload dead-letter channel.
///
/// Each run reads the whole channel from the earliest offset under a throwaway group and
/// republishes only events whose file is still in ERROR. Concurrent runs are not
/// coordinated; callers serialize them.
pub struct DeadLetterReconciler {
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn FileStatusStore>,
    dead_letter_channel: String,
    upload_channel: String,
    poll_timeout: Duration,
}

impl DeadLetterReconciler {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn FileStatusStore>,
        dead_letter_channel: impl Into<String>,
        upload_channel: impl Into<String>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            bus,
            store,
            dead_letter_channel: dead_letter_channel.into(),
            upload_channel: upload_channel.into(),
            poll_timeout,
        }
    }

    /// Replay the dead-letter channel and return how many events were republished
    pub async fn replay(&self) -> Result<usize, AppError> {
        Ok(self.replay_with_summary().await?.retried)
    }

    #[tracing::instrument(skip(self), fields(channel = %self.dead_letter_channel))]
    pub async fn replay_with_summary(&self) -> Result<ReplaySummary, AppError> {
        let mut reader = self.bus.open_replay(&self.dead_letter_channel).await?;
        let mut summary = ReplaySummary::default();

        loop {
            let batch = reader.poll(self.poll_timeout).await?;
            if batch.is_empty() {
                break;
            }

            for record in batch {
                let event: UploadEvent = match decode(&record.payload) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(
                            partition = record.partition,
                            offset = record.offset,
                            error = %e,
                            "Skipping undecodable dead-letter record"
                        );
                        summary.skipped += 1;
                        continue;
                    }
                };

                let status = self.store.find_status(&event.object_key).await?;
                if status != Some(ScanStatus::Error) {
                    tracing::debug!(
                        object_key = %event.object_key,
                        status = ?status,
                        "Dead-lettered event already resolved, skipping"
                    );
                    summary.skipped += 1;
                    continue;
                }

                let key = record.key.clone().unwrap_or_else(|| event.message_key());
                self.bus
                    .publish(OutboundMessage::new(
                        self.upload_channel.clone(),
                        Some(key),
                        record.payload.clone(),
                    ))
                    .await?;
                tracing::info!(
                    object_key = %event.object_key,
                    "Republished dead-lettered upload event"
                );
                summary.retried += 1;
            }
        }

        tracing::info!(
            retried = summary.retried,
            skipped = summary.skipped,
            "DLT retry completed: retried={}, skipped={}",
            summary.retried,
            summary.skipped
        );
        Ok(summary)
    }
}
