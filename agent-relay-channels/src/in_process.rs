//! Volatile channel backed by a bounded priority queue

use crate::base::{Channel, ChannelError, Result};
use agent_relay_core::bus::{DeliveryResult, Message, PriorityQueue};
use agent_relay_core::config::QueueConfig;
use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

/// In-process channel
///
/// Delivery is at-most-once: a received message is gone from the queue.
/// Sends only take the queue lock and never wait on I/O.
#[derive(Debug)]
pub struct InProcessChannel {
    id: String,
    queue: PriorityQueue,
}

impl InProcessChannel {
    /// Create a channel buffering at most `capacity` messages
    pub fn new(id: impl Into<String>, capacity: usize) -> Self {
        Self {
            id: id.into(),
            queue: PriorityQueue::new(capacity),
        }
    }

    /// Create a channel from queue configuration
    pub fn from_config(id: impl Into<String>, config: &QueueConfig) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ChannelError::InvalidConfig(
                "channel id must not be empty".to_string(),
            ));
        }
        Ok(Self::new(id, config.capacity))
    }

    /// Messages waiting in the queue, for every recipient
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Underlying queue
    pub fn queue(&self) -> &PriorityQueue {
        &self.queue
    }
}

#[async_trait]
impl Channel for InProcessChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, message: &Message) -> DeliveryResult {
        let start = Instant::now();

        // Never refused; at capacity the queue evicts its lowest-priority oldest slot
        self.queue.enqueue(message.clone());
        debug!(
            "Channel {} queued message {} for {}",
            self.id, message.id, message.recipient
        );
        DeliveryResult::delivered(&message.id, start.elapsed())
    }

    async fn receive_messages(&self, recipient: &str) -> Vec<Message> {
        let messages = self.queue.drain_matching(|m| m.is_for(recipient));
        if !messages.is_empty() {
            debug!(
                "Channel {} handed {} messages to {}",
                self.id,
                messages.len(),
                recipient
            );
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_relay_core::bus::{MessageType, Priority};
    use serde_json::json;

    fn msg(recipient: &str, priority: Priority, tag: &str) -> Message {
        Message::new("planner", recipient, MessageType::TaskUpdate, json!(tag))
            .with_priority(priority)
    }

    fn tags(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.payload.as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let channel = InProcessChannel::new("local", 10);
        let result = channel.send_message(&msg("worker-1", Priority::Normal, "a")).await;

        assert!(result.success);
        assert_eq!(channel.pending(), 1);

        let received = channel.receive_messages("worker-1").await;
        assert_eq!(tags(&received), vec!["a"]);
        // At-most-once: a second receive sees nothing
        assert!(channel.receive_messages("worker-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_receive_filters_recipient_and_includes_broadcast() {
        let channel = InProcessChannel::new("local", 10);
        channel.send_message(&msg("worker-1", Priority::Low, "mine-low")).await;
        channel.send_message(&msg("worker-2", Priority::Normal, "theirs-1")).await;
        channel
            .send_message(&msg("worker-1", Priority::Normal, "x").to_broadcast())
            .await;
        channel.send_message(&msg("worker-1", Priority::High, "mine-high")).await;
        channel.send_message(&msg("worker-2", Priority::Normal, "theirs-2")).await;

        let received = channel.receive_messages("worker-1").await;
        assert_eq!(tags(&received), vec!["mine-high", "x", "mine-low"]);

        let remaining = channel.receive_messages("worker-2").await;
        assert_eq!(tags(&remaining), vec!["theirs-1", "theirs-2"]);
        assert_eq!(channel.pending(), 0);
    }

    #[tokio::test]
    async fn test_send_succeeds_when_queue_outranks_message() {
        let channel = InProcessChannel::new("local", 1);
        channel.send_message(&msg("w", Priority::Critical, "evicted")).await;

        let result = channel.send_message(&msg("w", Priority::Low, "kept")).await;
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(channel.queue().evicted_count(), 1);
        assert_eq!(tags(&channel.receive_messages("w").await), vec!["kept"]);
    }

    #[test]
    fn test_from_config() {
        let config = QueueConfig { capacity: 3 };
        let channel = InProcessChannel::from_config("local", &config).unwrap();
        assert_eq!(channel.id(), "local");
        assert_eq!(channel.queue().capacity(), 3);

        assert!(InProcessChannel::from_config("  ", &config).is_err());
    }
}
