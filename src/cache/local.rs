// Start of file: /src/cache/local.rs

/*
    * In-process LRU cache backed by moka. Entries expire `ttl` after their
    * last use; every hit slides the expiry.
*/

use std::{
    future::Future,
    hash::Hash,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use moka::{future::Cache, notification::RemovalCause, policy::EvictionPolicy};
use tracing::debug;

pub const DEFAULT_MAXSIZE: usize = 128;

pub struct LruCache<K, V> {
    maxsize: usize,
    ttl: Option<Duration>,
    inner: Cache<K, V>,
    // Entries dropped by the idle timeout so far
    expired: Arc<AtomicUsize>,
}

impl<K, V> Default for LruCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAXSIZE, None)
    }
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// `maxsize` is clamped to at least one entry. `None` ttl never expires.
    pub fn new(maxsize: usize, ttl: Option<Duration>) -> Self {
        let maxsize: usize = maxsize.max(1);
        let expired: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let counter: Arc<AtomicUsize> = expired.clone();

        let mut builder = Cache::<K, V>::builder()
            .max_capacity(maxsize as u64)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |_key, _value, cause| {
                if cause == RemovalCause::Expired {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            });
        if let Some(ttl) = ttl {
            builder = builder.time_to_idle(ttl);
        }

        debug!(maxsize, ?ttl, "Created LRU cache");
        Self { maxsize, ttl, inner: builder.build(), expired }
    }

    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns a clone of the value and marks the entry as most recently used.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).await
    }

    /// Inserts or replaces `key`. The least recently used entry is evicted
    /// before this returns when the cache is over `maxsize`.
    pub async fn set(&self, key: K, value: V) {
        self.inner.insert(key, value).await;
        self.inner.run_pending_tasks().await;
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        self.inner.remove(key).await
    }

    pub async fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
    }

    /// Snapshot of the live entries, in no particular order.
    pub fn items(&self) -> Vec<(K, V)> {
        self.inner.iter().map(|(key, value)| (K::clone(&key), value)).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count() as usize
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops expired entries and returns how many were removed.
    pub async fn prune(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before: usize = self.expired.load(Ordering::Relaxed);
        self.inner.run_pending_tasks().await;
        self.expired.load(Ordering::Relaxed).saturating_sub(before)
    }

    /// Async memoization: returns the cached value or computes and stores it.
    /// Concurrent misses on the same key share one `compute` call. Errors are
    /// not cached.
    pub async fn get_or_insert_with<F, Fut, E>(&self, key: K, compute: F) -> Result<V, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Send + Sync + 'static,
    {
        let value: V = self.inner.try_get_with(key, compute()).await?;
        self.inner.run_pending_tasks().await;
        Ok(value)
    }
}


// End of file: /src/cache/local.rs
