//! # Status Publisher
//!
//! Outbound side of the bus: processing-status events, free-text trace
//! messages and per-key metric events, all keyed by task key.
//!
//! [`BusStatusPublisher`] fans records out over a tokio broadcast channel.
//! The transport adapter that forwards records to the broker subscribes to
//! it; publishing with no subscriber attached is not an error.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use super::errors::PublishError;
use super::message::{BusRecord, MetricEvent, ProcessingEvent};
use crate::config::TopicsConfig;
use crate::constants::ProcessingEventType;

#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish_processing_event(
        &self,
        key: &str,
        event_type: ProcessingEventType,
    ) -> Result<(), PublishError>;

    /// Publish a trace message: `"ok"` or an `Exception` summary
    async fn publish_message(&self, key: &str, message: &str) -> Result<(), PublishError>;

    async fn publish_metric(&self, key: &str, metric: &MetricEvent) -> Result<(), PublishError>;
}

#[derive(Debug, Clone)]
pub struct BusStatusPublisher {
    sender: broadcast::Sender<BusRecord>,
    topics: TopicsConfig,
}

impl BusStatusPublisher {
    /// Create a publisher with the specified channel capacity
    pub fn new(topics: TopicsConfig, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, topics }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusRecord> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn topics(&self) -> &TopicsConfig {
        &self.topics
    }

    fn send(&self, topic: &str, key: &str, value: &impl Serialize) -> Result<(), PublishError> {
        let record = BusRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: serde_json::to_value(value)?,
            published_at: chrono::Utc::now(),
        };
        trace!(topic = %topic, key = %key, "Publishing record");

        // no subscribers is acceptable
        let _ = self.sender.send(record);
        Ok(())
    }
}

#[async_trait]
impl StatusPublisher for BusStatusPublisher {
    async fn publish_processing_event(
        &self,
        key: &str,
        event_type: ProcessingEventType,
    ) -> Result<(), PublishError> {
        self.send(&self.topics.processing, key, &ProcessingEvent::new(event_type))
    }

    async fn publish_message(&self, key: &str, message: &str) -> Result<(), PublishError> {
        self.send(&self.topics.message, key, &message)
    }

    async fn publish_metric(&self, key: &str, metric: &MetricEvent) -> Result<(), PublishError> {
        self.send(&self.topics.metrics, key, metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_are_routed_to_their_topics() {
        let publisher = BusStatusPublisher::new(TopicsConfig::default(), 16);
        let mut rx = publisher.subscribe();

        publisher
            .publish_processing_event("k", ProcessingEventType::Started)
            .await
            .unwrap();
        publisher.publish_message("k", "ok").await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, publisher.topics().processing);
        assert_eq!(event.payload, serde_json::json!({"type": "STARTED"}));

        let message = rx.recv().await.unwrap();
        assert_eq!(message.topic, publisher.topics().message);
        assert_eq!(message.key, "k");
        assert_eq!(message.payload, serde_json::json!("ok"));
    }

    #[tokio::test]
    async fn test_publishing_without_subscribers_succeeds() {
        let publisher = BusStatusPublisher::new(TopicsConfig::default(), 4);
        assert_eq!(publisher.subscriber_count(), 0);

        let metric = MetricEvent::new("send files to archive", chrono::Utc::now(), 12);
        assert!(publisher.publish_metric("k", &metric).await.is_ok());
    }
}
