//! Real-time update broadcasting
//!
//! Propagates pattern and recommendation deltas to subscribers through a
//! transport-independent channel abstraction. The broadcaster also owns
//! the shared pattern cache; every successful store upsert invalidates it
//! before the change notification goes out.

pub mod cache;
pub mod connection;

pub use cache::{CachedPatterns, PatternCache};
pub use connection::{
    ConnectionConfig, ConnectionState, Frame, MessageTransport, SubscriberConnection,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

use crate::store::SuccessPattern;
use crate::Result;

/// Kinds of push messages emitted to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastEventType {
    PatternUpdated,
    NewAlert,
    ConversionUpdate,
}

/// One push message: type, timestamp, JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMessage {
    #[serde(rename = "type")]
    pub message_type: BroadcastEventType,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl EngineMessage {
    pub fn new(message_type: BroadcastEventType, payload: Value) -> Self {
        Self { message_type, timestamp: Utc::now(), payload }
    }
}

/// Fan-out point for engine deltas plus the pattern cache they invalidate
#[derive(Debug)]
pub struct Broadcaster {
    channel: broadcast::Sender<EngineMessage>,
    cache: PatternCache,
}

impl Broadcaster {
    pub fn new(capacity: usize, cache_ttl: Duration) -> Self {
        let (channel, _) = broadcast::channel(capacity);
        Self { channel, cache: PatternCache::new(cache_ttl) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineMessage> {
        self.channel.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.channel.receiver_count()
    }

    pub fn cache(&self) -> &PatternCache {
        &self.cache
    }

    /// Send a message to all current subscribers; returns how many
    /// received it. Having no subscribers is not a failure.
    pub fn publish(&self, message: EngineMessage) -> usize {
        match self.channel.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("no active subscribers, message dropped");
                0
            }
        }
    }

    /// Invalidate the cache and notify subscribers of a pattern change
    pub fn pattern_updated(&self, pattern: &SuccessPattern) -> Result<usize> {
        self.cache.invalidate();
        let payload = serde_json::to_value(pattern)?;
        Ok(self.publish(EngineMessage::new(BroadcastEventType::PatternUpdated, payload)))
    }

    /// Announce a newly promoted pattern
    pub fn new_alert(&self, pattern: &SuccessPattern) -> Result<usize> {
        let payload = serde_json::to_value(pattern)?;
        Ok(self.publish(EngineMessage::new(BroadcastEventType::NewAlert, payload)))
    }

    /// Push the running conversion picture after an ingested outcome
    pub fn conversion_update(&self, payload: Value) -> usize {
        self.publish(EngineMessage::new(BroadcastEventType::ConversionUpdate, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let broadcaster = Broadcaster::new(16, Duration::from_secs(60));
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        let reached = broadcaster
            .conversion_update(json!({ "totalOutcomes": 4, "successRate": 0.75 }));
        assert_eq!(reached, 2);

        let message = first.recv().await.unwrap();
        assert_eq!(message.message_type, BroadcastEventType::ConversionUpdate);
        assert_eq!(message.payload["successRate"], json!(0.75));
        assert_eq!(second.recv().await.unwrap(), message);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let broadcaster = Broadcaster::new(16, Duration::from_secs(60));
        assert_eq!(broadcaster.conversion_update(json!({})), 0);
    }

    #[test]
    fn test_message_serializes_with_type_tag() {
        let message = EngineMessage::new(BroadcastEventType::NewAlert, json!({ "id": "p1" }));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], json!("new_alert"));
        assert!(value.get("timestamp").is_some());
    }
}
