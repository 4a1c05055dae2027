//! Aggregation cache.
//!
//! Counter maps and assembled course lists are expensive to recompute, so
//! the aggregator stores them behind the `AggregationCache` trait. The
//! cache is strictly an optimization: the interface is infallible, and an
//! implementation that loses an entry or fails internally must present
//! that as a miss so callers recompute instead of erroring.

use crate::counters::CounterKind;
use crate::models::{CategoryId, CountMap, CourseRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Typed key for one cache entry.
///
/// Keys render to stable storage strings so implementations can back the
/// cache with any string-keyed medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The per-course count map of one concrete counter.
    Counts(CounterKind),
    /// The assembled course records, either unscoped or for one category
    /// scope.
    Courses(Option<CategoryId>),
}

impl CacheKey {
    /// Renders the stable storage string for this key.
    pub fn storage_key(&self) -> String {
        match self {
            CacheKey::Counts(kind) => format!("{}_counts", kind.name()),
            CacheKey::Courses(None) => "courses".to_string(),
            CacheKey::Courses(Some(category)) => format!("courses_{}", category),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

/// Value stored under a cache key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheValue {
    /// A counter's per-course count map.
    Counts(CountMap),
    /// Assembled course records for one scope.
    Courses(Vec<CourseRecord>),
}

/// Storage interface for aggregation results.
///
/// `get` answers `None` both for absent entries and for any internal
/// failure; `set` makes a best effort and never reports one. Concurrent
/// writers may race, in which case the last write wins, which is harmless
/// because entries for one key are recomputed from the same source data.
#[async_trait]
pub trait AggregationCache: Send + Sync {
    /// Looks up an entry, treating backend failures as misses.
    async fn get(&self, key: &CacheKey) -> Option<CacheValue>;

    /// Stores an entry, overwriting any previous value for the key.
    async fn set(&self, key: &CacheKey, value: CacheValue);

    /// Drops one entry if present.
    async fn invalidate(&self, key: &CacheKey);

    /// Drops every entry.
    async fn clear(&self);
}

/// Hit and miss counters for a cache instance.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to recomputation.
    pub misses: u64,
    /// Entries written.
    pub writes: u64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

/// In-memory cache for a single run of the report.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheValue>>,
    stats: CacheStats,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    /// Returns the current hit and miss counters.
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AggregationCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let entries = self.entries.read().await;
        match entries.get(&key.storage_key()) {
            Some(value) => {
                self.stats.record_hit();
                debug!("Cache hit for {}", key);
                Some(value.clone())
            }
            None => {
                self.stats.record_miss();
                debug!("Cache miss for {}", key);
                None
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: CacheValue) {
        let mut entries = self.entries.write().await;
        entries.insert(key.storage_key(), value);
        self.stats.record_write();
    }

    async fn invalidate(&self, key: &CacheKey) {
        let mut entries = self.entries.write().await;
        entries.remove(&key.storage_key());
    }

    async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }
}

/// Cache that stores nothing, for runs where caching is disabled.
pub struct NoopCache;

#[async_trait]
impl AggregationCache for NoopCache {
    async fn get(&self, _key: &CacheKey) -> Option<CacheValue> {
        None
    }

    async fn set(&self, _key: &CacheKey, _value: CacheValue) {}

    async fn invalidate(&self, _key: &CacheKey) {}

    async fn clear(&self) {}
}
