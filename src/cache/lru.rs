use crate::traits::{release_hook, CacheStats, Release, ReleaseHook};
use crate::{Result, TileError};
use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Fixed-capacity cache with strict least-recently-used eviction.
///
/// Inserting a new key into a full cache evicts exactly one entry, the least
/// recently used, and releases it before the new entry is admitted. `get`
/// and `put` both count as a use.
pub struct BoundedLru<K: Hash + Eq, V> {
    cache: Mutex<LruCache<K, V>>,
    release: Option<ReleaseHook<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Hash + Eq, V> BoundedLru<K, V> {
    /// Create a new cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            TileError::CacheInvariantViolation("LRU capacity must be positive".into())
        })?;
        Ok(Self {
            cache: Mutex::new(LruCache::new(capacity)),
            release: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Release evicted values through their [`Release`] implementation
    pub fn with_release(self) -> Self
    where
        V: Release + 'static,
    {
        self.with_release_hook_arc(release_hook::<V>())
    }

    /// Hand every value leaving the cache to `hook`
    pub fn with_release_hook(self, hook: impl Fn(V) + Send + Sync + 'static) -> Self {
        self.with_release_hook_arc(Arc::new(hook))
    }

    fn with_release_hook_arc(mut self, hook: ReleaseHook<V>) -> Self {
        self.release = Some(hook);
        self
    }

    /// Insert or replace a value; returns the key evicted to make room
    pub fn put(&self, key: K, value: V) -> Option<K> {
        let (displaced, evicted_key) = {
            let Ok(mut cache) = self.cache.lock() else {
                return None;
            };
            let replacing = cache.contains(&key);
            match cache.push(key, value) {
                Some((_, old)) if replacing => (Some(old), None),
                Some((evicted_key, old)) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    (Some(old), Some(evicted_key))
                }
                None => (None, None),
            }
        };

        if let Some(old) = displaced {
            self.release_value(old);
        }
        evicted_key
    }

    /// Look up a value, marking it most recently used
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let found = self.cache.lock().ok()?.get(key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Check if a key is cached without touching its recency
    pub fn contains(&self, key: &K) -> bool {
        self.cache
            .lock()
            .map(|cache| cache.contains(key))
            .unwrap_or(false)
    }

    /// Drop a single entry, releasing its value
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.cache.lock().ok().and_then(|mut cache| cache.pop(key));
        match removed {
            Some(value) => {
                self.release_value(value);
                true
            }
            None => false,
        }
    }

    /// Release every value and empty the cache
    pub fn clear(&self) {
        let drained: Vec<V> = match self.cache.lock() {
            Ok(mut cache) => {
                let mut values = Vec::with_capacity(cache.len());
                while let Some((_, value)) = cache.pop_lru() {
                    values.push(value);
                }
                values
            }
            Err(_) => Vec::new(),
        };
        for value in drained {
            self.release_value(value);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .map(|cache| cache.cap().get())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
        }
    }

    fn release_value(&self, value: V) {
        if let Some(release) = &self.release {
            release(value);
        }
    }
}

impl<K: Hash + Eq, V> Drop for BoundedLru<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}
