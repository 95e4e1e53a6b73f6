//! Core types for agent-relay
//!
//! This crate provides the message envelope, the bounded priority queue,
//! the TTL/LRU cache, the circuit breaker and retry policy, plus the
//! configuration and logging setup shared by all agent-relay components.

pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod resilience;
pub mod utils;

pub use error::{Error, Result};
