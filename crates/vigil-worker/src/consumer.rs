//! Consumer loop: receive, decode, run the redelivery policy, commit.
//!
//! Shutdown is checked between messages only; a message that started processing runs
//! to completion (including its backoff delays) before the loop exits.

use crate::{DeliveryOutcome, MessageHandler, Recoverer, RedeliveryPolicy};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use vigil_bus::{decode, BusResult, MessageBus, Record, Subscription};
use vigil_core::HandlerError;

/// Pause after a transport error before polling again
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct ConsumerLoop<M: Send + Sync> {
    name: String,
    bus: Arc<dyn MessageBus>,
    channel: String,
    group: String,
    policy: RedeliveryPolicy,
    handler: Arc<dyn MessageHandler<M>>,
    recoverer: Arc<dyn Recoverer<M>>,
    _message: PhantomData<fn() -> M>,
}

impl<M> ConsumerLoop<M>
where
    M: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        bus: Arc<dyn MessageBus>,
        channel: impl Into<String>,
        group: impl Into<String>,
        policy: RedeliveryPolicy,
        handler: Arc<dyn MessageHandler<M>>,
        recoverer: Arc<dyn Recoverer<M>>,
    ) -> Self {
        Self {
            name: name.into(),
            bus,
            channel: channel.into(),
            group: group.into(),
            policy,
            handler,
            recoverer,
            _message: PhantomData,
        }
    }

    /// Spawn `workers` loops sharing the consumer group. The transport gives each
    /// partition to one member, so per-partition order holds.
    pub fn spawn_workers(
        self: &Arc<Self>,
        workers: usize,
        shutdown: watch::Receiver<bool>,
    ) -> JoinSet<BusResult<()>> {
        let mut set = JoinSet::new();
        for worker in 0..workers.max(1) {
            let this = Arc::clone(self);
            let shutdown = shutdown.clone();
            set.spawn(async move {
                tracing::info!(consumer = %this.name, worker, "Consumer worker started");
                let result = this.run(shutdown).await;
                tracing::info!(consumer = %this.name, worker, "Consumer worker stopped");
                result
            });
        }
        set
    }

    /// Consume until `shutdown` flips to `true` or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> BusResult<()> {
        let mut subscription = self.bus.subscribe(&self.channel, &self.group).await?;
        tracing::info!(
            consumer = %self.name,
            channel = %self.channel,
            group = %self.group,
            "Consumer loop subscribed"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = subscription.next() => received,
            };

            let record = match received {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(consumer = %self.name, error = %e, "Failed to receive record");
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                    continue;
                }
            };

            if !self.settle(&record, &mut shutdown).await {
                // Shut down before the record was settled; it stays uncommitted
                break;
            }

            if let Err(e) = subscription.commit(&record).await {
                tracing::error!(
                    consumer = %self.name,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Failed to commit offset"
                );
            }
        }

        Ok(())
    }

    /// Process one record until it is handled or recovered. Returns `false` if shutdown
    /// arrived while recovery kept failing.
    async fn settle(&self, record: &Record, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut outcome = self.process(record).await;
        loop {
            match outcome {
                DeliveryOutcome::Handled { attempts } => {
                    tracing::debug!(
                        consumer = %self.name,
                        partition = record.partition,
                        offset = record.offset,
                        attempts,
                        "Record handled"
                    );
                    return true;
                }
                DeliveryOutcome::Recovered { attempts } => {
                    tracing::warn!(
                        consumer = %self.name,
                        partition = record.partition,
                        offset = record.offset,
                        attempts,
                        "Record recovered after failed delivery"
                    );
                    return true;
                }
                DeliveryOutcome::RecoveryFailed { attempts, .. } => {
                    let wait = self.policy.backoff().max_delay;
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                return false;
                            }
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                    outcome = self.recover_again(record, attempts).await;
                }
            }
        }
    }

    /// Decode `record` and run the redelivery policy over it
    pub async fn process(&self, record: &Record) -> DeliveryOutcome {
        match decode::<M>(&record.payload) {
            Ok(message) => {
                self.policy
                    .process(record, &message, self.handler.as_ref(), self.recoverer.as_ref())
                    .await
            }
            Err(e) => {
                tracing::error!(
                    consumer = %self.name,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Undecodable payload"
                );
                let error = HandlerError::fatal(e);
                self.policy
                    .recover::<M, _>(record, None, &error, 1, self.recoverer.as_ref())
                    .await
            }
        }
    }

    async fn recover_again(&self, record: &Record, attempts: u32) -> DeliveryOutcome {
        let message = decode::<M>(&record.payload).ok();
        let error = HandlerError::fatal(anyhow::anyhow!(
            "redelivery exhausted after {} attempts",
            attempts
        ));
        self.policy
            .recover(record, message.as_ref(), &error, attempts, self.recoverer.as_ref())
            .await
    }

    /// Receive and settle exactly one record, then commit it
    pub async fn run_once(
        &self,
        subscription: &mut dyn Subscription,
    ) -> BusResult<DeliveryOutcome> {
        let record = subscription.next().await?;
        let outcome = self.process(&record).await;
        if outcome.is_settled() {
            subscription.commit(&record).await?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackoffConfig, DeliveryAttempt};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use vigil_bus::{MemoryBus, OutboundMessage, Publisher};

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<u32>>,
        fail_on: Option<u32>,
    }

    #[async_trait]
    impl MessageHandler<Ping> for Collect {
        async fn handle(
            &self,
            message: &Ping,
            _attempt: &DeliveryAttempt,
        ) -> Result<(), HandlerError> {
            if self.fail_on == Some(message.n) {
                return Err(HandlerError::retryable(anyhow::anyhow!("boom")));
            }
            self.seen.lock().push(message.n);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Parked {
        records: Mutex<Vec<(i64, Option<Ping>)>>,
    }

    #[async_trait]
    impl Recoverer<Ping> for Parked {
        async fn recover(
            &self,
            record: &Record,
            message: Option<&Ping>,
            _error: &HandlerError,
        ) -> anyhow::Result<()> {
            self.records.lock().push((record.offset, message.cloned()));
            Ok(())
        }
    }

    fn consumer(
        bus: &MemoryBus,
        handler: Arc<Collect>,
        recoverer: Arc<Parked>,
    ) -> ConsumerLoop<Ping> {
        let policy = RedeliveryPolicy::new(BackoffConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(100),
        });
        ConsumerLoop::new(
            "test",
            Arc::new(bus.clone()),
            "pings",
            "group",
            policy,
            handler,
            recoverer,
        )
    }

    async fn publish(bus: &MemoryBus, payload: &[u8]) {
        bus.publish(
            OutboundMessage::new("pings", Some("k".to_string()), payload.to_vec().into())
                .with_partition(0),
        )
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn handles_and_commits_in_order() {
        let bus = MemoryBus::with_partitions(1);
        let handler = Arc::new(Collect::default());
        let consumer = consumer(&bus, handler.clone(), Arc::new(Parked::default()));
        let mut sub = bus.subscribe("pings", "group").await.unwrap();

        for n in 1..=3 {
            publish(&bus, format!("{{\"n\":{}}}", n).as_bytes()).await;
        }
        for _ in 0..3 {
            let outcome = consumer.run_once(sub.as_mut()).await.unwrap();
            assert!(matches!(outcome, DeliveryOutcome::Handled { .. }));
        }

        assert_eq!(*handler.seen.lock(), vec![1, 2, 3]);
        assert_eq!(bus.committed_offset("pings", "group", 0), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_payload_goes_to_recoverer_without_message() {
        let bus = MemoryBus::with_partitions(1);
        let handler = Arc::new(Collect::default());
        let parked = Arc::new(Parked::default());
        let consumer = consumer(&bus, handler.clone(), parked.clone());
        let mut sub = bus.subscribe("pings", "group").await.unwrap();

        publish(&bus, b"{broken").await;
        let outcome = consumer.run_once(sub.as_mut()).await.unwrap();

        assert!(matches!(outcome, DeliveryOutcome::Recovered { attempts: 1 }));
        assert_eq!(*parked.records.lock(), vec![(0, None)]);
        assert!(handler.seen.lock().is_empty());
        assert_eq!(bus.committed_offset("pings", "group", 0), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_message_does_not_block_the_next_one() {
        let bus = MemoryBus::with_partitions(1);
        let handler = Arc::new(Collect {
            fail_on: Some(1),
            ..Default::default()
        });
        let parked = Arc::new(Parked::default());
        let consumer = Arc::new(consumer(&bus, handler.clone(), parked.clone()));

        publish(&bus, br#"{"n":1}"#).await;
        publish(&bus, br#"{"n":2}"#).await;

        let (tx, rx) = watch::channel(false);
        let mut workers = consumer.spawn_workers(1, rx);

        while bus.committed_offset("pings", "group", 0) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();
        while let Some(joined) = workers.join_next().await {
            joined.unwrap().unwrap();
        }

        assert_eq!(*handler.seen.lock(), vec![2]);
        assert_eq!(*parked.records.lock(), vec![(0, Some(Ping { n: 1 }))]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_shutdown_is_signalled() {
        let bus = MemoryBus::new();
        let consumer = Arc::new(consumer(
            &bus,
            Arc::new(Collect::default()),
            Arc::new(Parked::default()),
        ));
        let (tx, rx) = watch::channel(false);
        let mut workers = consumer.spawn_workers(2, rx);

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let mut stopped = 0;
        while let Some(joined) = workers.join_next().await {
            joined.unwrap().unwrap();
            stopped += 1;
        }
        assert_eq!(stopped, 2);
    }
}
