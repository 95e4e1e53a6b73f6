//! Retry with exponential backoff
//!
//! Attempt `k` (0-indexed) that fails is followed by a wait of
//! `base_delay * 2^k` before attempt `k + 1`. There is no wait before the
//! first attempt. When every attempt fails, the final attempt's error is
//! returned.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Retry policy for arbitrary fallible calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, so `max_retries + 1` attempts in total
    pub max_retries: u32,
    /// Wait after the first failed attempt
    pub base_delay: Duration,
    /// Upper bound for a single wait
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Create a policy without a delay cap
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: None,
        }
    }

    /// Cap every individual wait
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Wait between attempt `attempt` and `attempt + 1` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Attempts made before giving up, saturating at `u32::MAX`
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run an async call until it succeeds or attempts run out
    ///
    /// The wait between attempts is a `tokio::time::sleep`, so other tasks
    /// keep running while this one backs off.
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            "Succeeded on attempt {} after {:?}",
                            attempt.saturating_add(1),
                            start.elapsed()
                        );
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= self.max_retries => {
                    warn!("All {} attempts failed, last error: {}", self.total_attempts(), e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt + 1,
                        self.total_attempts(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run a blocking call until it succeeds or attempts run out
    ///
    /// Blocks the current thread while waiting; do not call from an async task.
    pub fn execute_blocking<F, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_retries => {
                    warn!("All {} attempts failed, last error: {}", self.total_attempts(), e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt + 1,
                        self.total_attempts(),
                        e,
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Run `f` up to `max_retries + 1` times with exponential backoff
pub async fn execute_with_retry<F, Fut, T, E>(
    f: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    RetryPolicy::new(max_retries, base_delay).execute(f).await
}
