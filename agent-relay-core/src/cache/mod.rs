//! TTL/LRU cache for memoizing intermediate results

pub mod manager;
pub mod types;

pub use manager::CacheManager;
pub use types::{CacheSettings, CacheStats, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL};
