//! Realtime fan-out for websocket subscribers.
//!
//! Each named channel gets its own `broadcast` sender. A subscriber
//! doesn't receive the broadcast receiver directly -- it gets a bounded
//! `mpsc` receiver fed by a forwarding task, so a slow websocket write
//! drops that one subscriber's connection instead of backpressuring the
//! producers or the other subscribers.

use crate::models::ChangeEvent;
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc, RwLock};

const CHANNEL_BROADCAST_CAPACITY: usize = 256;
const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

/// Channels a client may subscribe to over `WS /ws/{channel}`.
pub const KNOWN_CHANNELS: &[&str] = &["tasks", "agents", "context", "rag"];

pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, broadcast::Sender<ChangeEvent>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()) }
    }

    async fn sender_for(&self, channel: &str) -> broadcast::Sender<ChangeEvent> {
        if let Some(sender) = self.channels.read().await.get(channel) {
            return sender.clone();
        }
        let mut guard = self.channels.write().await;
        guard
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_BROADCAST_CAPACITY).0)
            .clone()
    }

    /// Publishes to a channel. No-op (beyond dropping the event) if
    /// nobody is subscribed.
    pub async fn publish(&self, channel: &str, event: ChangeEvent) {
        let sender = self.sender_for(channel).await;
        let _ = sender.send(event);
    }

    /// Subscribes to a channel, returning a bounded receiver fed by a
    /// background forwarding task. The task exits (closing the receiver)
    /// once the subscriber falls behind its queue capacity or the
    /// broadcast channel is dropped.
    pub async fn subscribe(&self, channel: &str) -> mpsc::Receiver<ChangeEvent> {
        let mut broadcast_rx = self.sender_for(channel).await.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        if tx.try_send(event).is_err() {
                            tracing::warn!("subscriber queue full, dropping connection");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber lagged, dropping connection");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let registry = ChannelRegistry::new();
        let mut rx = registry.subscribe("tasks").await;
        registry
            .publish("tasks", ChangeEvent::new("task_created", "t1", serde_json::json!({})))
            .await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.entity_id, "t1");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let registry = ChannelRegistry::new();
        registry
            .publish("empty", ChangeEvent::new("noop", "x", serde_json::json!({})))
            .await;
    }

    #[tokio::test]
    async fn subscriber_count_reflects_active_subscriptions() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.subscriber_count("tasks").await, 0);
        let _rx = registry.subscribe("tasks").await;
        assert_eq!(registry.subscriber_count("tasks").await, 1);
    }
}
