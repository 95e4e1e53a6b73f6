//! Base traits for channels and message handlers

use agent_relay_core::bus::{DeliveryResult, Message};
use async_trait::async_trait;
use std::sync::Arc;

/// Transport capable of sending and receiving message envelopes
///
/// Implementations never fail a send with an error; problems are reported
/// in the returned `DeliveryResult`.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel id used for routing
    fn id(&self) -> &str;

    /// Send a message
    async fn send_message(&self, message: &Message) -> DeliveryResult;

    /// Take every message currently available for `recipient`
    ///
    /// Each call returns a finite batch; whether a message can show up again
    /// on a later call depends on the transport.
    async fn receive_messages(&self, recipient: &str) -> Vec<Message>;
}

/// Reactive post-processing for received messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Whether this handler wants the message
    fn can_handle(&self, message: &Message) -> bool;

    /// Process the message
    async fn handle(&self, message: &Message) -> anyhow::Result<DeliveryResult>;
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error(transparent)]
    Core(#[from] agent_relay_core::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Shared channel type
pub type ChannelPtr = Arc<dyn Channel>;

/// Shared handler type
pub type MessageHandlerPtr = Arc<dyn MessageHandler>;
