//! Failure handling for calls into unreliable dependencies
//!
//! The breaker and the retry policy are independent; compose them by
//! retrying a breaker-protected call, or by protecting a retried one.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerSettings, CircuitBreakerSnapshot,
    CircuitState, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT,
};
pub use retry::{execute_with_retry, RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};
