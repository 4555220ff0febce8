//! Staleness-bounded memoization for market data lookups.
//!
//! A [`TtlCache`] bounds both how many entries it holds and how old an entry
//! may get before it is treated as missing. [`cached`] wraps any fetch
//! function around a cache instance, storing only successful, present values.

use anyhow::Result;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Type-erased value shared by every caller that hits the same entry.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Cache used by the market data adapters.
pub type MarketCache = TtlCache<CacheKey, CachedValue>;

/// Identifies a logical request: the operation plus its arguments in call order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: &'static str,
    args: Vec<String>,
}

impl CacheKey {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(value.to_string());
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.operation, self.args.join(", "))
    }
}

/// In-memory cache bounded by entry count and time-to-live.
///
/// Expired entries are never returned. When the cache is full, the least
/// recently used entry makes room for the new one.
pub struct TtlCache<K, V>
where
    K: Eq + Hash + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    name: &'static str,
    inner: Cache<K, V>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, max_entries: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |key: Arc<K>, _value: V, cause: RemovalCause| {
                if cause.was_evicted() {
                    debug!(cache = name, ?key, ?cause, "Cache EVICT");
                }
            })
            .build();
        Self { name, inner }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let value = self.inner.get(key).await;
        match value {
            Some(_) => debug!(cache = self.name, ?key, "Cache HIT"),
            None => debug!(cache = self.name, ?key, "Cache MISS"),
        }
        value
    }

    pub async fn put(&self, key: K, value: V) {
        debug!(cache = self.name, ?key, "Cache PUT");
        self.inner.insert(key, value).await;
    }

    /// Number of live entries once pending evictions have been applied.
    #[cfg(test)]
    async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}

/// Returns the live cached value for `key`, or runs `fetch` and caches its result.
///
/// Only `Ok(Some(_))` is stored. Absent values and errors are handed back to
/// the caller untouched so the next call retries the fetch.
pub async fn cached<T, F, Fut>(
    cache: &MarketCache,
    key: CacheKey,
    fetch: F,
) -> Result<Option<Arc<T>>>
where
    T: Any + Send + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    if let Some(hit) = cache.get(&key).await {
        match hit.downcast::<T>() {
            Ok(value) => return Ok(Some(value)),
            Err(_) => debug!(%key, "Cached value has an unexpected type, fetching again"),
        }
    }

    match fetch().await? {
        Some(value) => {
            let value = Arc::new(value);
            cache.put(key, value.clone() as CachedValue).await;
            Ok(Some(value))
        }
        None => {
            debug!(%key, "Not caching absent result");
            Ok(None)
        }
    }
}
