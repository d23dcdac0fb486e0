#[cfg(feature = "kafka")]
use crate::KafkaBus;
#[cfg(not(feature = "kafka"))]
use crate::BusError;
use crate::{BusBackend, BusResult, MemoryBus, MessageBus};
use std::sync::Arc;
use vigil_core::BusConfig;

/// Create a message bus based on configuration
pub fn create_bus(config: &BusConfig) -> BusResult<Arc<dyn MessageBus>> {
    match config.backend {
        #[cfg(feature = "kafka")]
        BusBackend::Kafka => Ok(Arc::new(KafkaBus::new(config)?)),

        #[cfg(not(feature = "kafka"))]
        BusBackend::Kafka => Err(BusError::Config(
            "Kafka backend not available (kafka feature not enabled)".to_string(),
        )),

        BusBackend::Memory => {
            tracing::warn!(
                "Using in-memory message bus; messages are not shared between processes"
            );
            Ok(Arc::new(MemoryBus::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OutboundMessage, Publisher};
    use bytes::Bytes;
    use vigil_core::TopicConfig;

    #[tokio::test]
    async fn memory_backend_round_trips_through_trait_object() {
        let config = BusConfig {
            backend: BusBackend::Memory,
            brokers: String::new(),
            client_id: "vigil".to_string(),
            group_id: "g".to_string(),
            results_group_id: "r".to_string(),
            topics: TopicConfig {
                upload_events: "u".to_string(),
                scan_results: "s".to_string(),
                upload_events_dlt: "d".to_string(),
            },
        };
        let bus = create_bus(&config).unwrap();
        let mut sub = bus.subscribe("u", "g").await.unwrap();
        bus.publish(OutboundMessage::new("u", None, Bytes::from_static(b"x")))
            .await
            .unwrap();
        assert_eq!(sub.next().await.unwrap().payload, Bytes::from_static(b"x"));
    }
}
