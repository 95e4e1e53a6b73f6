//! Channels and routing for agent-relay
//!
//! This crate provides the channel abstraction, the in-process and durable
//! mailbox transports, and the router that ties them to message handlers.

pub mod base;
pub mod durable;
pub mod in_process;
pub mod router;

pub use base::{Channel, ChannelError, ChannelPtr, MessageHandler, MessageHandlerPtr, Result};
pub use durable::DurableChannel;
pub use in_process::InProcessChannel;
pub use router::{
    status_reporter, DeliveryCounters, Router, RouterStatistics, RouterStatus, CHANNEL_NOT_FOUND,
};
