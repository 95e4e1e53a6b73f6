//! Circuit breaker for unreliable dependencies
//!
//! Transitions:
//! - Closed: calls pass through; `failure_threshold` consecutive failures open the circuit
//! - Open: calls fail immediately until `recovery_timeout` has passed since the last failure
//! - HalfOpen: one call at a time probes the dependency; success closes, failure re-opens,
//!   and other calls are rejected while the probe is in flight

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default number of consecutive failures that open the circuit
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default wait before probing an open circuit
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time after the last failure before a probe call is allowed
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
        }
    }
}

/// Error returned by a protected call
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the wrapped function was not invoked
    #[error("circuit '{name}' is open, retry in {retry_after:?}")]
    Open { name: String, retry_after: Duration },

    /// The wrapped function failed
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the call was short-circuited
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }

    /// The wrapped function's error, if it ran
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            CircuitBreakerError::Open { .. } => None,
        }
    }
}

impl From<CircuitBreakerError<crate::Error>> for crate::Error {
    fn from(e: CircuitBreakerError<crate::Error>) -> Self {
        match e {
            CircuitBreakerError::Open { name, .. } => crate::Error::CircuitOpen(name),
            CircuitBreakerError::Inner(inner) => inner,
        }
    }
}

/// Serializable view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub ms_since_last_failure: Option<u64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    /// A half-open probe is in flight
    probing: bool,
}

/// Admission to run the wrapped call
///
/// Dropping a probe permit without finishing it (the caller's future was
/// cancelled) frees the probe slot so the next caller can try.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    finished: bool,
}

impl Permit<'_> {
    fn finish(mut self, success: bool) {
        self.finished = true;
        self.breaker.record(success);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.finished {
            self.breaker.state.lock().probing = false;
            debug!("Circuit '{}' probe abandoned", self.breaker.name);
        }
    }
}

/// Fault-isolation wrapper around one protected call-site
///
/// Create one per dependency and keep it for the life of the process; the
/// lock only covers state transitions, never the wrapped call.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: CircuitBreakerSettings,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    pub fn new(name: impl Into<String>, settings: CircuitBreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings: CircuitBreakerSettings {
                failure_threshold: settings.failure_threshold.max(1),
                ..settings
            },
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                probing: false,
            }),
        }
    }

    /// Breaker name used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    ///
    /// An open circuit whose recovery timeout has passed still reports
    /// `Open` until the next call moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Consecutive failures recorded
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Run an async call through the breaker
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire()?;
        let outcome = f().await;
        permit.finish(outcome.is_ok());
        outcome.map_err(CircuitBreakerError::Inner)
    }

    /// Run a blocking call through the breaker
    pub fn call_blocking<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let permit = self.acquire()?;
        let outcome = f();
        permit.finish(outcome.is_ok());
        outcome.map_err(CircuitBreakerError::Inner)
    }

    /// Force the circuit closed with zero failures
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.last_failure_time = None;
        state.probing = false;
        info!("Circuit '{}' reset", self.name);
    }

    /// Serializable view of the breaker
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let state = self.state.lock();
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            failure_threshold: self.settings.failure_threshold,
            recovery_timeout_ms: self.settings.recovery_timeout.as_millis() as u64,
            ms_since_last_failure: state
                .last_failure_time
                .map(|t| t.elapsed().as_millis() as u64),
        }
    }

    fn acquire<E>(&self) -> Result<Permit<'_>, CircuitBreakerError<E>> {
        let mut state = self.state.lock();
        let permit = |probe| Permit {
            breaker: self,
            probe,
            finished: false,
        };

        let current = state.state;
        match current {
            CircuitState::Closed => Ok(permit(false)),
            CircuitState::HalfOpen if !state.probing => {
                state.probing = true;
                Ok(permit(true))
            }
            CircuitState::HalfOpen => {
                debug!("Circuit '{}' probe in flight, rejecting call", self.name);
                Err(CircuitBreakerError::Open {
                    name: self.name.clone(),
                    retry_after: Duration::ZERO,
                })
            }
            CircuitState::Open => {
                let elapsed = state
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);

                if elapsed >= self.settings.recovery_timeout {
                    state.state = CircuitState::HalfOpen;
                    state.probing = true;
                    info!("Circuit '{}' half-open, probing", self.name);
                    Ok(permit(true))
                } else {
                    debug!("Circuit '{}' open, rejecting call", self.name);
                    Err(CircuitBreakerError::Open {
                        name: self.name.clone(),
                        retry_after: self.settings.recovery_timeout - elapsed,
                    })
                }
            }
        }
    }

    fn record(&self, success: bool) {
        let mut state = self.state.lock();
        state.probing = false;

        if success {
            state.failure_count = 0;
            if state.state != CircuitState::Closed {
                info!("Circuit '{}' closed", self.name);
            }
            state.state = CircuitState::Closed;
            return;
        }

        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                warn!("Circuit '{}' probe failed, re-opened", self.name);
            }
            CircuitState::Closed if state.failure_count >= self.settings.failure_threshold => {
                state.state = CircuitState::Open;
                warn!(
                    "Circuit '{}' opened after {} consecutive failures",
                    self.name, state.failure_count
                );
            }
            _ => {}
        }
    }
}
