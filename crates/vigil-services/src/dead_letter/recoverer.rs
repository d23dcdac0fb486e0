use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use vigil_bus::{MessageBus, OutboundMessage, Record};
use vigil_core::constants::DLQ_SCAN_FAILED;
use vigil_core::{HandlerError, ScanResult, UploadEvent};
use vigil_worker::Recoverer;

/// Routes upload events the scan worker gave up on.
///
/// First publishes an ERROR result for the event (best-effort: a failure is logged and
/// does not block the dead-letter write), then copies the original record to the
/// dead-letter channel on the same partition with the same key.
///
/// The consumer calls `recover` again while the dead-letter write keeps failing. The
/// ERROR result is attempted once per record regardless of how many calls that takes.
pub struct DeadLetterRecoverer {
    bus: Arc<dyn MessageBus>,
    results_channel: String,
    dead_letter_channel: String,
    /// Records whose ERROR result was attempted but whose dead-letter write is pending
    error_result_sent: Mutex<HashSet<RecordId>>,
}

type RecordId = (String, i32, i64);

fn record_id(record: &Record) -> RecordId {
    (record.channel.clone(), record.partition, record.offset)
}

impl DeadLetterRecoverer {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        results_channel: impl Into<String>,
        dead_letter_channel: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            results_channel: results_channel.into(),
            dead_letter_channel: dead_letter_channel.into(),
            error_result_sent: Mutex::new(HashSet::new()),
        }
    }

    async fn publish_error_result(&self, event: &UploadEvent) {
        let result =
            ScanResult::error(&event.object_key, DLQ_SCAN_FAILED).with_file_id(event.file_id);
        let sent = match OutboundMessage::json(&self.results_channel, &event.object_key, &result)
        {
            Ok(message) => self.bus.publish(message).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(()) => tracing::info!(
                object_key = %event.object_key,
                "Published ERROR result for exhausted upload event"
            ),
            Err(e) => tracing::error!(
                object_key = %event.object_key,
                error = %e,
                "Failed to publish ERROR result before dead-lettering"
            ),
        }
    }
}

#[async_trait]
impl Recoverer<UploadEvent> for DeadLetterRecoverer {
    async fn recover(
        &self,
        record: &Record,
        event: Option<&UploadEvent>,
        error: &HandlerError,
    ) -> anyhow::Result<()> {
        let id = record_id(record);
        if let Some(event) = event {
            let first_call = self.error_result_sent.lock().insert(id.clone());
            if first_call {
                self.publish_error_result(event).await;
            } else {
                tracing::debug!(
                    object_key = %event.object_key,
                    "ERROR result already attempted, retrying dead-letter write only"
                );
            }
        }

        let message = OutboundMessage::new(
            self.dead_letter_channel.clone(),
            record.key.clone(),
            record.payload.clone(),
        )
        .with_partition(record.partition);
        self.bus.publish(message).await?;
        self.error_result_sent.lock().remove(&id);

        tracing::error!(
            object_key = event.map(|e| e.object_key.as_str()).unwrap_or("<undecodable>"),
            source_partition = record.partition,
            source_offset = record.offset,
            dead_letter_channel = %self.dead_letter_channel,
            error = %error,
            "Upload event dead-lettered"
        );
        Ok(())
    }
}
