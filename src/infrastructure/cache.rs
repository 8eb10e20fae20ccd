// Page cache - process-wide LRU of rendered responses with a time-to-live.
// Lives outside the entity store's consistency boundary: entries are not
// invalidated by writes and may be served stale until they expire or the
// cache is cleared.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

pub struct Cache<K, V> {
    inner: LruCache<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K: std::hash::Hash + Eq, V: Clone> Cache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Cache {
            inner: LruCache::new(capacity),
            ttl,
        }
    }

    /// Expired entries are dropped on lookup.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = match self.inner.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.inner.pop(key);
        }
        None
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.inner.put(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key).map(|entry| entry.value)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Shared cache of serialised pages keyed by request URI.
pub struct PageCache {
    inner: Mutex<Cache<String, Vec<u8>>>,
}

impl PageCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Cache::new(capacity, ttl)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let hit = self.inner.lock().await.get(&key.to_string());
        debug!(key, hit = hit.is_some(), "Page cache lookup");
        hit
    }

    pub async fn insert(&self, key: &str, body: Vec<u8>) {
        self.inner.lock().await.insert(key.to_string(), body);
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
