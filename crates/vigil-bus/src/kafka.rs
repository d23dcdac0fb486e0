//! Kafka transport built on `rdkafka`
//!
//! Producers wait for broker acknowledgement. Consumers disable auto-commit and commit
//! `offset + 1` explicitly once a record has been handled, so a crash mid-message leads
//! to redelivery rather than loss.

use crate::traits::{MessageBus, OutboundMessage, Publisher, Record, ReplayReader, Subscription};
use crate::{BusError, BusResult};
use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use vigil_core::BusConfig;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a replay poll keeps collecting once the first record of a batch arrived
const REPLAY_DRAIN_GRACE: Duration = Duration::from_millis(100);
const MAX_REPLAY_BATCH: usize = 500;

impl From<KafkaError> for BusError {
    fn from(err: KafkaError) -> Self {
        BusError::Receive(err.to_string())
    }
}

/// Kafka-backed message bus
pub struct KafkaBus {
    producer: FutureProducer,
    brokers: String,
    client_id: String,
}

impl KafkaBus {
    pub fn new(config: &BusConfig) -> BusResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| BusError::Config(format!("Kafka producer: {}", e)))?;

        tracing::info!(
            brokers = %config.brokers,
            client_id = %config.client_id,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            brokers: config.brokers.clone(),
            client_id: config.client_id.clone(),
        })
    }

    fn consumer_config(&self, group: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest");
        config
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> Record {
    Record {
        channel: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: message
            .payload()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default(),
    }
}

#[async_trait]
impl Publisher for KafkaBus {
    async fn publish(&self, message: OutboundMessage) -> BusResult<()> {
        let mut record: FutureRecord<'_, str, [u8]> =
            FutureRecord::to(&message.channel).payload(message.payload.as_ref());
        if let Some(key) = message.key.as_deref() {
            record = record.key(key);
        }
        if let Some(partition) = message.partition {
            record = record.partition(partition);
        }

        self.producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map(|_| ())
            .map_err(|(e, _)| BusError::Publish {
                channel: message.channel.clone(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    async fn subscribe(&self, channel: &str, group: &str) -> BusResult<Box<dyn Subscription>> {
        let consumer: StreamConsumer = self
            .consumer_config(group)
            .create()
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        consumer
            .subscribe(&[channel])
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        tracing::info!(channel = %channel, group = %group, "Kafka consumer subscribed");
        Ok(Box::new(KafkaSubscription { consumer }))
    }

    async fn open_replay(&self, channel: &str) -> BusResult<Box<dyn ReplayReader>> {
        let group = format!("dlt-replay-{}", uuid::Uuid::new_v4());
        let consumer: StreamConsumer = self
            .consumer_config(&group)
            .create()
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        // Metadata lookup blocks on the network
        let topic = channel.to_string();
        let consumer = tokio::task::spawn_blocking(move || -> BusResult<StreamConsumer> {
            let metadata = consumer
                .fetch_metadata(Some(&topic), METADATA_TIMEOUT)
                .map_err(|e| BusError::Subscribe(e.to_string()))?;

            let mut assignment = TopicPartitionList::new();
            for meta in metadata.topics().iter().filter(|t| t.name() == topic) {
                for partition in meta.partitions() {
                    assignment
                        .add_partition_offset(&topic, partition.id(), Offset::Beginning)
                        .map_err(|e| BusError::Subscribe(e.to_string()))?;
                }
            }
            if assignment.count() == 0 {
                return Err(BusError::Subscribe(format!(
                    "topic {} has no partitions",
                    topic
                )));
            }
            consumer
                .assign(&assignment)
                .map_err(|e| BusError::Subscribe(e.to_string()))?;
            Ok(consumer)
        })
        .await
        .map_err(|e| BusError::Subscribe(format!("metadata task failed: {}", e)))??;

        tracing::info!(
            channel = %channel,
            group = %group,
            "Replay reader assigned at earliest offsets"
        );
        Ok(Box::new(KafkaReplay { consumer }))
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn next(&mut self) -> BusResult<Record> {
        let message = self.consumer.recv().await?;
        Ok(to_record(&message))
    }

    async fn commit(&mut self, record: &Record) -> BusResult<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &record.channel,
                record.partition,
                Offset::Offset(record.offset + 1),
            )
            .map_err(|e| BusError::Commit(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BusError::Commit(e.to_string()))
    }
}

struct KafkaReplay {
    consumer: StreamConsumer,
}

#[async_trait]
impl ReplayReader for KafkaReplay {
    async fn poll(&mut self, timeout: Duration) -> BusResult<Vec<Record>> {
        let mut batch = Vec::new();
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => return Ok(batch),
            Ok(message) => batch.push(to_record(&message?)),
        }
        while batch.len() < MAX_REPLAY_BATCH {
            match tokio::time::timeout(REPLAY_DRAIN_GRACE, self.consumer.recv()).await {
                Ok(message) => batch.push(to_record(&message?)),
                Err(_) => break,
            }
        }
        Ok(batch)
    }
}
