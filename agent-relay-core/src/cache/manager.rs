//! TTL + LRU key-value cache

use super::types::{CacheSettings, CacheStats};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    /// `None` when the TTL is too large to represent
    expires_at: Option<Instant>,
    /// Logical access time, unique per entry
    last_access: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Logical access time -> key, oldest first
    access_order: BTreeMap<u64, String>,
    clock: u64,
    stats: CacheStats,
}

impl<V> CacheInner<V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.access_order.remove(&entry.last_access);
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, key) = self.access_order.pop_first()?;
        self.entries.remove(&key);
        self.stats.evictions += 1;
        Some(key)
    }
}

/// General-purpose memoization store with per-entry expiry
///
/// Expiry and capacity eviction are independent: an entry can be evicted
/// for capacity before its TTL passes, and an expired entry is never
/// returned even if it was accessed recently. Capacity eviction removes the
/// least recently accessed entry, where both `get` and `set` count as access.
#[derive(Debug)]
pub struct CacheManager<V> {
    settings: CacheSettings,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone> CacheManager<V> {
    /// Create a cache with the given settings
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings: CacheSettings {
                max_entries: settings.max_entries.max(1),
                ..settings
            },
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                access_order: BTreeMap::new(),
                clock: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Create a cache holding at most `max_entries` with the default TTL
    pub fn with_capacity(max_entries: usize) -> Self {
        Self::new(CacheSettings {
            max_entries,
            ..CacheSettings::default()
        })
    }

    /// Store a value; `ttl` falls back to the default TTL
    ///
    /// Returns `false` without storing anything when the TTL is zero.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> bool {
        let key = key.into();
        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        if ttl.is_zero() {
            debug!("Cache set for {} ignored: zero TTL", key);
            return false;
        }

        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.remove(&key).is_none() && inner.entries.len() >= self.settings.max_entries {
            if let Some(evicted) = inner.evict_lru() {
                debug!("Cache full ({}), evicted {}", self.settings.max_entries, evicted);
            }
        }

        let last_access = inner.tick();
        inner.access_order.insert(last_access, key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now.checked_add(ttl),
                last_access,
            },
        );
        true
    }

    /// Look up a live value, purging it if it has expired
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key).map(|entry| entry.is_expired(now)) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(expired) => expired,
        };

        if expired {
            inner.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            return None;
        }

        let tick = inner.tick();
        let entry = inner.entries.get_mut(key)?;
        let previous = std::mem::replace(&mut entry.last_access, tick);
        let value = entry.value.clone();
        inner.access_order.remove(&previous);
        inner.access_order.insert(tick, key.to_string());
        inner.stats.hits += 1;
        Some(value)
    }

    /// Whether a live entry exists, without counting as an access
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove an entry, returning whether it existed
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Remove every expired entry, returning how many were removed
    pub fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
        }
        inner.stats.expirations += expired.len() as u64;

        if !expired.is_empty() {
            debug!("Swept {} expired cache entries", expired.len());
        }
        expired.len()
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.access_order.clear();
    }

    /// Number of stored entries, expired ones included until swept
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }

    /// Settings in effect
    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    /// Return the cached value or compute, store and return it
    ///
    /// The lock is not held while `init` runs, so concurrent callers may
    /// compute the same key more than once; the last write wins.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        init: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = init().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }
}

impl<V: Clone> Default for CacheManager<V> {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}
