//! Cache configuration and statistics types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum number of cache entries
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;

/// Default entry lifetime: 1 hour
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Runtime cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Entries kept before LRU eviction kicks in
    pub max_entries: usize,
    /// TTL used when `set` is called without one
    pub default_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            default_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

/// Counters describing cache behaviour since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to respect capacity
    pub evictions: u64,
    /// Entries removed because their TTL passed
    pub expirations: u64,
    /// Entries currently stored (expired ones included until swept)
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when nothing was looked up
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}
