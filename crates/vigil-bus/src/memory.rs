//! In-process partitioned log
//!
//! Mirrors the parts of Kafka the pipeline relies on: keyed partitioning, per-group
//! committed offsets, one owner per partition within a group, and replay from offset 0.
//! Records are never removed.

use crate::traits::{MessageBus, OutboundMessage, Publisher, Record, ReplayReader, Subscription};
use crate::{BusError, BusResult};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const DEFAULT_PARTITIONS: i32 = 3;
const MAX_REPLAY_BATCH: usize = 500;

#[derive(Clone)]
struct StoredMessage {
    key: Option<String>,
    payload: Bytes,
}

#[derive(Default)]
struct GroupState {
    committed: HashMap<i32, i64>,
    leased: HashSet<i32>,
    cursor: usize,
}

#[derive(Default)]
struct State {
    channels: HashMap<String, Vec<Vec<StoredMessage>>>,
    groups: HashMap<(String, String), GroupState>,
    failing: HashSet<String>,
}

struct Inner {
    partitions: i32,
    state: Mutex<State>,
    notify: Notify,
    round_robin: AtomicUsize,
}

/// In-memory message bus
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: i32) -> Self {
        Self {
            inner: Arc::new(Inner {
                partitions: partitions.max(1),
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                round_robin: AtomicUsize::new(0),
            }),
        }
    }

    pub fn partitions(&self) -> i32 {
        self.inner.partitions
    }

    /// Every record published to `channel`, ordered by partition then offset
    pub fn records(&self, channel: &str) -> Vec<Record> {
        let state = self.inner.state.lock();
        let Some(partitions) = state.channels.get(channel) else {
            return Vec::new();
        };
        partitions
            .iter()
            .enumerate()
            .flat_map(|(partition, log)| {
                log.iter()
                    .enumerate()
                    .map(move |(offset, m)| to_record(channel, partition as i32, offset as i64, m))
            })
            .collect()
    }

    /// Make publishes to `channel` fail until reset
    pub fn set_fail_publishes(&self, channel: &str, fail: bool) {
        let mut state = self.inner.state.lock();
        if fail {
            state.failing.insert(channel.to_string());
        } else {
            state.failing.remove(channel);
        }
    }

    /// Next offset `group` will consume on `partition`
    pub fn committed_offset(&self, channel: &str, group: &str, partition: i32) -> i64 {
        let state = self.inner.state.lock();
        state
            .groups
            .get(&(channel.to_string(), group.to_string()))
            .and_then(|g| g.committed.get(&partition).copied())
            .unwrap_or(0)
    }

    fn partition_for(&self, message: &OutboundMessage) -> BusResult<i32> {
        if let Some(partition) = message.partition {
            if partition < 0 || partition >= self.inner.partitions {
                return Err(BusError::InvalidPartition {
                    channel: message.channel.clone(),
                    partition,
                });
            }
            return Ok(partition);
        }
        let partitions = self.inner.partitions as u64;
        match &message.key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                Ok((hasher.finish() % partitions) as i32)
            }
            None => {
                let next = self.inner.round_robin.fetch_add(1, Ordering::Relaxed) as u64;
                Ok((next % partitions) as i32)
            }
        }
    }

    fn try_lease(&self, channel: &str, group: &str, held: Option<i32>) -> Option<Record> {
        let partitions = self.inner.partitions;
        let mut state = self.inner.state.lock();
        let State {
            channels, groups, ..
        } = &mut *state;
        let logs = channels.get(channel)?;
        let group_state = groups
            .entry((channel.to_string(), group.to_string()))
            .or_default();

        // An uncommitted record is handed out again before anything else
        if let Some(partition) = held {
            let offset = group_state.committed.get(&partition).copied().unwrap_or(0);
            return logs[partition as usize]
                .get(offset as usize)
                .map(|m| to_record(channel, partition, offset, m));
        }

        for step in 0..partitions as usize {
            let partition = ((group_state.cursor + step) % partitions as usize) as i32;
            if group_state.leased.contains(&partition) {
                continue;
            }
            let offset = group_state.committed.get(&partition).copied().unwrap_or(0);
            if let Some(m) = logs[partition as usize].get(offset as usize) {
                group_state.leased.insert(partition);
                group_state.cursor = partition as usize + 1;
                return Some(to_record(channel, partition, offset, m));
            }
        }
        None
    }

    fn release(&self, channel: &str, group: &str, partition: i32, next_offset: Option<i64>) {
        {
            let mut state = self.inner.state.lock();
            if let Some(group_state) = state
                .groups
                .get_mut(&(channel.to_string(), group.to_string()))
            {
                group_state.leased.remove(&partition);
                if let Some(next) = next_offset {
                    let committed = group_state.committed.entry(partition).or_insert(0);
                    *committed = (*committed).max(next);
                }
            }
        }
        self.inner.notify.notify_waiters();
    }

    fn read_from(&self, channel: &str, positions: &mut HashMap<i32, i64>) -> Vec<Record> {
        let state = self.inner.state.lock();
        let Some(logs) = state.channels.get(channel) else {
            return Vec::new();
        };
        let mut batch = Vec::new();
        for (partition, log) in logs.iter().enumerate() {
            let partition = partition as i32;
            let position = positions.entry(partition).or_insert(0);
            while batch.len() < MAX_REPLAY_BATCH {
                let Some(m) = log.get(*position as usize) else {
                    break;
                };
                batch.push(to_record(channel, partition, *position, m));
                *position += 1;
            }
        }
        batch
    }
}

fn to_record(channel: &str, partition: i32, offset: i64, message: &StoredMessage) -> Record {
    Record {
        channel: channel.to_string(),
        partition,
        offset,
        key: message.key.clone(),
        payload: message.payload.clone(),
    }
}

#[async_trait]
impl Publisher for MemoryBus {
    async fn publish(&self, message: OutboundMessage) -> BusResult<()> {
        let partition = self.partition_for(&message)?;
        {
            let mut state = self.inner.state.lock();
            if state.failing.contains(&message.channel) {
                return Err(BusError::Publish {
                    channel: message.channel,
                    message: "publishing disabled".to_string(),
                });
            }
            let partitions = self.inner.partitions as usize;
            let logs = state
                .channels
                .entry(message.channel.clone())
                .or_insert_with(|| vec![Vec::new(); partitions]);
            logs[partition as usize].push(StoredMessage {
                key: message.key,
                payload: message.payload,
            });
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn subscribe(&self, channel: &str, group: &str) -> BusResult<Box<dyn Subscription>> {
        Ok(Box::new(MemorySubscription {
            bus: self.clone(),
            channel: channel.to_string(),
            group: group.to_string(),
            held: None,
        }))
    }

    async fn open_replay(&self, channel: &str) -> BusResult<Box<dyn ReplayReader>> {
        Ok(Box::new(MemoryReplay {
            bus: self.clone(),
            channel: channel.to_string(),
            positions: HashMap::new(),
        }))
    }
}

struct MemorySubscription {
    bus: MemoryBus,
    channel: String,
    group: String,
    held: Option<i32>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> BusResult<Record> {
        loop {
            let notified = self.bus.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(record) = self.bus.try_lease(&self.channel, &self.group, self.held) {
                self.held = Some(record.partition);
                return Ok(record);
            }
            notified.await;
        }
    }

    async fn commit(&mut self, record: &Record) -> BusResult<()> {
        if self.held == Some(record.partition) {
            self.held = None;
        }
        self.bus.release(
            &self.channel,
            &self.group,
            record.partition,
            Some(record.offset + 1),
        );
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        if let Some(partition) = self.held.take() {
            self.bus.release(&self.channel, &self.group, partition, None);
        }
    }
}

struct MemoryReplay {
    bus: MemoryBus,
    channel: String,
    positions: HashMap<i32, i64>,
}

#[async_trait]
impl ReplayReader for MemoryReplay {
    async fn poll(&mut self, timeout: Duration) -> BusResult<Vec<Record>> {
        let notified = self.bus.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let batch = self.bus.read_from(&self.channel, &mut self.positions);
        if !batch.is_empty() {
            return Ok(batch);
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        Ok(self.bus.read_from(&self.channel, &mut self.positions))
    }
}
