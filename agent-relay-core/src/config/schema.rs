//! Configuration schema definitions

use crate::bus::DEFAULT_QUEUE_CAPACITY;
use crate::cache::{CacheSettings, DEFAULT_CACHE_MAX_ENTRIES};
use crate::resilience::{CircuitBreakerSettings, RetryPolicy, DEFAULT_FAILURE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration for agent-relay
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    /// In-process channel queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Circuit breaker defaults
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Retry defaults
    #[serde(default)]
    pub retry: RetryConfig,
    /// Durable channel configuration
    #[serde(default)]
    pub durable: DurableConfig,
    /// Periodic maintenance configuration
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// In-process queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum messages buffered per in-process channel
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_cache_max_entries() -> usize {
    DEFAULT_CACHE_MAX_ENTRIES
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            default_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// Runtime cache settings
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            max_entries: self.max_entries,
            default_ttl: Duration::from_secs(self.default_ttl_secs),
        }
    }
}

/// Circuit breaker defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_recovery_timeout_secs() -> u64 {
    60
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

impl BreakerConfig {
    /// Runtime breaker settings
    pub fn settings(&self) -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
        }
    }
}

/// Retry defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap for a single backoff wait
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: None,
        }
    }
}

impl RetryConfig {
    /// Runtime retry policy
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: self.max_delay_ms.map(Duration::from_millis),
        }
    }
}

/// Durable channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableConfig {
    /// Root directory holding one mailbox per recipient
    #[serde(default = "default_durable_root")]
    pub root: String,
}

fn default_durable_root() -> String {
    "~/.agent-relay/mailboxes".to_string()
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            root: default_durable_root(),
        }
    }
}

/// Periodic maintenance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between maintenance ticks
    #[serde(default = "default_maintenance_interval")]
    pub interval_s: u64,
}

fn default_true() -> bool {
    true
}

fn default_maintenance_interval() -> u64 {
    60
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_s: default_maintenance_interval(),
        }
    }
}
