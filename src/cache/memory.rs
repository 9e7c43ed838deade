//! Viewport-sized memory cache for fetched tiles
//!
//! Capacity is a window `(min_tiles, max_tiles)` instead of one number. The
//! owner moves the window as the number of needed tiles changes, so the
//! cache grows with large screens and shrinks back on small ones. When an
//! insert pushes the count above `max_tiles`, least-recently-used entries are
//! evicted until the count is back at `min_tiles`; the gap between the two
//! bounds keeps eviction from running on every insert.

use crate::traits::{release_hook, CacheStats, Cacheable, Release, ReleaseHook};
use crate::{Result, TileError};
use lru::LruCache;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    min_tiles: usize,
    max_tiles: usize,
}

impl<K: Hash + Eq, V> Inner<K, V> {
    /// Pop least-recently-used entries until at or below `min_tiles`
    fn shrink(&mut self, evicted: &mut Vec<V>) {
        if self.entries.len() <= self.max_tiles {
            return;
        }
        while self.entries.len() > self.min_tiles {
            match self.entries.pop_lru() {
                Some((_, value)) => evicted.push(value),
                None => break,
            }
        }
    }
}

pub struct MemoryCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    release: Option<ReleaseHook<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

fn check_window(min_tiles: usize, max_tiles: usize) -> Result<()> {
    if max_tiles == 0 || max_tiles < min_tiles {
        return Err(TileError::CacheInvariantViolation(format!(
            "memory cache window {}..{} is empty or inverted",
            min_tiles, max_tiles
        )));
    }
    Ok(())
}

impl<K: Hash + Eq, V> MemoryCache<K, V> {
    /// Create a cache with the capacity window `min_tiles..=max_tiles`
    pub fn new(min_tiles: usize, max_tiles: usize) -> Result<Self> {
        check_window(min_tiles, max_tiles)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                min_tiles,
                max_tiles,
            }),
            release: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Release evicted values through their [`Release`] implementation
    pub fn with_release(mut self) -> Self
    where
        V: Release + 'static,
    {
        self.release = Some(release_hook::<V>());
        self
    }

    /// Hand every value leaving the cache to `hook`
    pub fn with_release_hook(mut self, hook: impl Fn(V) + Send + Sync + 'static) -> Self {
        self.release = Some(Arc::new(hook));
        self
    }

    /// Move the capacity window. Shrinks immediately if the cache is above
    /// the new `max_tiles`.
    pub fn set_bounds(&self, min_tiles: usize, max_tiles: usize) -> Result<()> {
        check_window(min_tiles, max_tiles)?;
        let mut evicted = Vec::new();
        if let Ok(mut inner) = self.inner.lock() {
            inner.min_tiles = min_tiles;
            inner.max_tiles = max_tiles;
            inner.shrink(&mut evicted);
            self.evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        }
        self.release_evicted(evicted);
        Ok(())
    }

    /// Current `(min_tiles, max_tiles)` window
    pub fn bounds(&self) -> (usize, usize) {
        self.inner
            .lock()
            .map(|inner| (inner.min_tiles, inner.max_tiles))
            .unwrap_or((0, 0))
    }

    /// Insert a value, evicting down to `min_tiles` when `max_tiles` is exceeded
    pub fn put(&self, key: K, value: V) {
        let mut evicted = Vec::new();
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(old) = inner.entries.put(key, value) {
                evicted.push(old);
            }
            let before = evicted.len();
            inner.shrink(&mut evicted);
            self.evictions
                .fetch_add((evicted.len() - before) as u64, Ordering::Relaxed);
        }
        self.release_evicted(evicted);
    }

    /// Look up a value, marking it most recently used
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let found = self.inner.lock().ok()?.entries.get(key).cloned();
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
        self.inner
            .lock()
            .map(|inner| inner.entries.contains(key))
            .unwrap_or(false)
    }

    /// Drop a single entry, releasing its value
    pub fn remove(&self, key: &K) -> bool {
        let removed = self
            .inner
            .lock()
            .ok()
            .and_then(|mut inner| inner.entries.pop(key));
        let found = removed.is_some();
        self.release_evicted(removed.into_iter().collect());
        found
    }

    /// Release every value and empty the cache
    pub fn clear(&self) {
        let mut drained = Vec::new();
        if let Ok(mut inner) = self.inner.lock() {
            while let Some((_, value)) = inner.entries.pop_lru() {
                drained.push(value);
            }
        }
        self.release_evicted(drained);
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
        }
    }

    // Runs outside the lock so hooks may touch the cache again.
    fn release_evicted(&self, values: Vec<V>) {
        match &self.release {
            Some(release) => values.into_iter().for_each(|value| release(value)),
            None => drop(values),
        }
    }
}

impl<K: Hash + Eq, V> Drop for MemoryCache<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Implement the shared Cacheable surface for MemoryCache
impl<K: Hash + Eq + Clone, V: Clone> Cacheable for MemoryCache<K, V> {
    type Key = K;
    type Value = V;

    fn get_cached(&self, key: &Self::Key) -> Option<Self::Value> {
        self.get(key)
    }

    fn cache(&self, key: Self::Key, value: Self::Value) {
        self.put(key, value);
    }

    fn invalidate(&self, key: &Self::Key) {
        self.remove(key);
    }

    fn clear_cache(&self) {
        self.clear();
    }

    fn cache_stats(&self) -> CacheStats {
        self.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::TileCoord;

    fn coord(i: i32) -> TileCoord {
        TileCoord::new(i, 0, 4)
    }

    #[test]
    fn test_evicts_down_to_min_when_max_exceeded() {
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = released.clone();
        let cache = MemoryCache::new(3, 5)
            .unwrap()
            .with_release_hook(move |v: i32| sink.lock().unwrap().push(v));

        for i in 0..5 {
            cache.put(coord(i), i);
        }
        assert_eq!(cache.len(), 5);
        assert!(released.lock().unwrap().is_empty());

        cache.put(coord(5), 5);
        assert_eq!(cache.len(), 3);
        assert_eq!(*released.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(cache.stats().evictions, 3);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = MemoryCache::new(2, 3).unwrap();
        cache.put(coord(0), "zero");
        cache.put(coord(1), "one");
        cache.put(coord(2), "two");
        assert_eq!(cache.get(&coord(0)), Some("zero"));

        cache.put(coord(3), "three");
        assert!(cache.contains(&coord(0)));
        assert!(cache.contains(&coord(3)));
        assert!(!cache.contains(&coord(1)));
        assert!(!cache.contains(&coord(2)));
    }

    #[test]
    fn test_set_bounds_shrinks_and_validates() {
        let cache = MemoryCache::new(10, 20).unwrap();
        for i in 0..15 {
            cache.put(coord(i), i);
        }
        cache.set_bounds(4, 8).unwrap();
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.bounds(), (4, 8));
        assert!(cache.contains(&coord(14)));

        assert!(matches!(
            cache.set_bounds(9, 8),
            Err(TileError::CacheInvariantViolation(_))
        ));
        assert_eq!(cache.bounds(), (4, 8));
        assert!(MemoryCache::<TileCoord, u8>::new(0, 0).is_err());
    }

    #[test]
    fn test_cacheable_surface() {
        let cache = MemoryCache::new(1, 2).unwrap();
        cache.cache(coord(1), 10u32);
        assert_eq!(cache.get_cached(&coord(1)), Some(10));
        assert_eq!(cache.get_cached(&coord(2)), None);
        cache.invalidate(&coord(1));
        assert!(cache.is_empty());

        let stats = cache.cache_stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }
}
