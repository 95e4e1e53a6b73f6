//! Message envelope and priority queue
//!
//! Everything that travels through a channel is a [`Message`]; in-process
//! channels buffer them in a [`PriorityQueue`].

pub mod message;
pub mod queue;

pub use message::{
    DeliveryResult, Message, MessageType, Priority, BROADCAST_ID_SUFFIX, BROADCAST_RECIPIENT,
};
pub use queue::{PriorityQueue, DEFAULT_QUEUE_CAPACITY};
