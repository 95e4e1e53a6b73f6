//! Message router

use crate::base::{ChannelPtr, MessageHandlerPtr};
use agent_relay_core::bus::{DeliveryResult, Message, MessageType, Priority};
use agent_relay_core::maintenance::MaintenanceCallback;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Error reported when the target channel is not registered
pub const CHANNEL_NOT_FOUND: &str = "channel not found";

/// Delivery counters for one slice of traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryCounters {
    pub sent: u64,
    pub received: u64,
    pub errors: u64,
}

/// Router traffic statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouterStatistics {
    pub totals: DeliveryCounters,
    pub by_type: BTreeMap<MessageType, DeliveryCounters>,
    pub by_priority: BTreeMap<Priority, DeliveryCounters>,
}

impl RouterStatistics {
    fn record(&mut self, message: &Message, bump: impl Fn(&mut DeliveryCounters)) {
        bump(&mut self.totals);
        bump(self.by_type.entry(message.message_type).or_default());
        bump(self.by_priority.entry(message.priority).or_default());
    }

    fn record_delivery(&mut self, message: &Message, result: &DeliveryResult) {
        if result.success {
            self.record(message, |c| c.sent += 1);
        } else {
            self.record(message, |c| c.errors += 1);
        }
    }
}

/// Point-in-time view of the router
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub active_channels: Vec<String>,
    pub registered_handlers: Vec<String>,
    pub statistics: RouterStatistics,
}

/// Routes messages to registered channels and dispatches received messages
/// to handlers
///
/// Channels and handlers are keyed by id, so iteration (and therefore the
/// default broadcast order) follows id order.
#[derive(Default)]
pub struct Router {
    channels: RwLock<BTreeMap<String, ChannelPtr>>,
    handlers: RwLock<BTreeMap<String, MessageHandlerPtr>>,
    statistics: Mutex<RouterStatistics>,
}

impl Router {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel under its own id, replacing any previous one
    pub async fn register_channel(&self, channel: ChannelPtr) {
        let id = channel.id().to_string();
        let mut channels = self.channels.write().await;
        if channels.insert(id.clone(), channel).is_some() {
            tracing::warn!("Channel {} replaced", id);
        } else {
            tracing::info!("Channel {} registered", id);
        }
    }

    /// Remove a channel
    pub async fn unregister_channel(&self, id: &str) -> Option<ChannelPtr> {
        let removed = self.channels.write().await.remove(id);
        if removed.is_some() {
            tracing::info!("Channel {} unregistered", id);
        }
        removed
    }

    /// Register a message handler, replacing any previous one with the same id
    pub async fn register_handler(&self, id: impl Into<String>, handler: MessageHandlerPtr) {
        let id = id.into();
        let mut handlers = self.handlers.write().await;
        if handlers.insert(id.clone(), handler).is_some() {
            tracing::warn!("Handler {} replaced", id);
        } else {
            tracing::info!("Handler {} registered", id);
        }
    }

    /// Remove a message handler
    pub async fn unregister_handler(&self, id: &str) -> Option<MessageHandlerPtr> {
        let removed = self.handlers.write().await.remove(id);
        if removed.is_some() {
            tracing::info!("Handler {} unregistered", id);
        }
        removed
    }

    /// Get a channel by id
    pub async fn channel(&self, id: &str) -> Option<ChannelPtr> {
        self.channels.read().await.get(id).cloned()
    }

    /// Ids of all registered channels
    pub async fn list_channels(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// Ids of all registered handlers
    pub async fn list_handlers(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }

    /// Send a direct message through one channel
    ///
    /// Broadcast messages are refused here; use [`Router::broadcast`].
    pub async fn send(&self, message: &Message, channel_id: &str) -> DeliveryResult {
        if message.is_broadcast() {
            let result = DeliveryResult::failed(
                &message.id,
                "broadcast recipient requires Router::broadcast",
                Default::default(),
            );
            self.statistics.lock().record_delivery(message, &result);
            return result;
        }

        self.deliver(message, channel_id).await
    }

    /// Send a message to several channels at once
    ///
    /// The message is rewritten as a broadcast (`<id>_broadcast`, recipient
    /// `all`). Without explicit ids every registered channel is targeted.
    /// Results come back in target order.
    pub async fn broadcast(
        &self,
        message: &Message,
        channel_ids: Option<&[&str]>,
    ) -> Vec<DeliveryResult> {
        let broadcast = message.to_broadcast();
        let targets: Vec<String> = match channel_ids {
            Some(ids) => ids.iter().map(|id| id.to_string()).collect(),
            None => self.list_channels().await,
        };

        tracing::debug!(
            "Broadcasting message {} to {} channels",
            broadcast.id,
            targets.len()
        );

        join_all(targets.iter().map(|id| self.deliver(&broadcast, id))).await
    }

    async fn deliver(&self, message: &Message, channel_id: &str) -> DeliveryResult {
        let start = Instant::now();

        let result = match self.channel(channel_id).await {
            Some(channel) => channel.send_message(message).await,
            None => {
                tracing::warn!(
                    "Cannot deliver message {}: channel {} not found",
                    message.id,
                    channel_id
                );
                DeliveryResult::failed(&message.id, CHANNEL_NOT_FOUND, start.elapsed())
            }
        };

        if let Some(error) = &result.error {
            tracing::debug!(
                "Delivery of {} via {} failed: {}",
                message.id,
                channel_id,
                error
            );
        }

        self.statistics.lock().record_delivery(message, &result);
        result
    }

    /// Collect messages for `recipient` and run matching handlers on each
    ///
    /// Without explicit ids every registered channel is polled. Messages are
    /// returned grouped by channel, in target order. A failing or panicking
    /// handler is logged and does not affect the returned messages.
    pub async fn receive(&self, recipient: &str, channel_ids: Option<&[&str]>) -> Vec<Message> {
        let channels: Vec<ChannelPtr> = {
            let registered = self.channels.read().await;
            match channel_ids {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| {
                        let channel = registered.get(*id).cloned();
                        if channel.is_none() {
                            tracing::warn!("Skipping receive on unknown channel {}", id);
                        }
                        channel
                    })
                    .collect(),
                None => registered.values().cloned().collect(),
            }
        };

        let batches = join_all(
            channels
                .iter()
                .map(|channel| channel.receive_messages(recipient)),
        )
        .await;

        let messages: Vec<Message> = batches.into_iter().flatten().collect();

        {
            let mut stats = self.statistics.lock();
            for message in &messages {
                stats.record(message, |c| c.received += 1);
            }
        }

        self.dispatch(&messages).await;
        messages
    }

    async fn dispatch(&self, messages: &[Message]) {
        let handlers: Vec<(String, MessageHandlerPtr)> = self
            .handlers
            .read()
            .await
            .iter()
            .map(|(id, handler)| (id.clone(), Arc::clone(handler)))
            .collect();

        if handlers.is_empty() {
            return;
        }

        for message in messages {
            for (id, handler) in &handlers {
                let wants =
                    std::panic::catch_unwind(AssertUnwindSafe(|| handler.can_handle(message)));
                match wants {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(_) => {
                        tracing::error!("Handler {} panicked in can_handle for {}", id, message.id);
                        continue;
                    }
                }

                match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
                    Ok(Ok(result)) if !result.success => {
                        tracing::warn!(
                            "Handler {} reported failure for {}: {}",
                            id,
                            message.id,
                            result.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    Ok(Ok(_)) => {
                        tracing::debug!("Handler {} processed {}", id, message.id);
                    }
                    Ok(Err(e)) => {
                        tracing::error!("Handler {} failed on {}: {:#}", id, message.id, e);
                    }
                    Err(_) => {
                        tracing::error!("Handler {} panicked on {}", id, message.id);
                    }
                }
            }
        }
    }

    /// Current traffic statistics
    pub fn statistics(&self) -> RouterStatistics {
        self.statistics.lock().clone()
    }

    /// Snapshot of registered channels, handlers and statistics
    pub async fn status(&self) -> RouterStatus {
        RouterStatus {
            active_channels: self.list_channels().await,
            registered_handlers: self.list_handlers().await,
            statistics: self.statistics(),
        }
    }
}

/// Maintenance callback logging a one-line router summary on every tick
pub fn status_reporter(router: Arc<Router>) -> MaintenanceCallback {
    Arc::new(move || {
        let router = Arc::clone(&router);
        Box::pin(async move {
            let status = router.status().await;
            let totals = status.statistics.totals;
            tracing::info!(
                channels = status.active_channels.len(),
                handlers = status.registered_handlers.len(),
                sent = totals.sent,
                received = totals.received,
                errors = totals.errors,
                "Router status"
            );
        })
    })
}
