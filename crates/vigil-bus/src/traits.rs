//! Transport abstraction traits
//!
//! Every backend exposes the same three capabilities: publishing to a channel,
//! consuming a channel as a member of a consumer group, and replaying a channel from its
//! earliest offset under a throwaway group.

use crate::codec::encode;
use crate::BusResult;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;

/// A record read from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub channel: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Bytes,
}

/// A message to publish
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub channel: String,
    pub key: Option<String>,
    /// Explicit partition; `None` lets the transport pick one from the key
    pub partition: Option<i32>,
    pub payload: Bytes,
}

impl OutboundMessage {
    pub fn new(channel: impl Into<String>, key: Option<String>, payload: Bytes) -> Self {
        Self {
            channel: channel.into(),
            key,
            partition: None,
            payload,
        }
    }

    /// Serialize `value` as JSON into a keyed message
    pub fn json<T: Serialize>(
        channel: impl Into<String>,
        key: impl Into<String>,
        value: &T,
    ) -> BusResult<Self> {
        Ok(Self::new(channel, Some(key.into()), encode(value)?))
    }

    /// Pin the message to a partition
    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a message and wait for the transport to acknowledge it
    async fn publish(&self, message: OutboundMessage) -> BusResult<()>;
}

/// Group membership on one channel.
///
/// The transport hands each partition to at most one subscription of a group at a time.
/// Callers must `commit` a record before its partition advances for the group.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next record
    async fn next(&mut self) -> BusResult<Record>;

    /// Mark `record` as processed for the group
    async fn commit(&mut self, record: &Record) -> BusResult<()>;
}

/// Reader positioned at the earliest offset of every partition of a channel
#[async_trait]
pub trait ReplayReader: Send {
    /// Return the next batch of records. An empty batch means nothing arrived within
    /// `timeout`.
    async fn poll(&mut self, timeout: Duration) -> BusResult<Vec<Record>>;
}

#[async_trait]
pub trait MessageBus: Publisher {
    async fn subscribe(&self, channel: &str, group: &str) -> BusResult<Box<dyn Subscription>>;

    /// Open a disposable reader over `channel` from the beginning. No offsets are
    /// committed on its behalf.
    async fn open_replay(&self, channel: &str) -> BusResult<Box<dyn ReplayReader>>;
}
