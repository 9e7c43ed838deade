//! Shared trait abstractions for the cache family
//!
//! The caches in [`crate::cache`] own their values outright. When a value
//! leaves a cache (eviction, replacement, `clear` or drop) the cache hands it
//! to its release hook exactly once, synchronously, before the reference is
//! gone.

use std::sync::Arc;

/// Explicit release capability for cached values.
///
/// Implement this for values holding resources that should be freed as soon
/// as the owning cache lets go of them (GPU textures, file handles, pooled
/// buffers). Wire it into a cache with `with_release()`.
pub trait Release {
    /// Free the resources held by this value.
    fn release(self);
}

/// Callback invoked with every value a cache gives up.
pub type ReleaseHook<V> = Arc<dyn Fn(V) + Send + Sync>;

/// Build the release hook that forwards to [`Release::release`].
pub fn release_hook<V: Release + 'static>() -> ReleaseHook<V> {
    Arc::new(|value: V| value.release())
}

/// Trait for cacheable operations
/// Standardizes the lookup surface shared by the bounded caches
pub trait Cacheable {
    type Key: Clone + Eq + std::hash::Hash;
    type Value: Clone;

    /// Get cached value
    fn get_cached(&self, key: &Self::Key) -> Option<Self::Value>;

    /// Cache a value
    fn cache(&self, key: Self::Key, value: Self::Value);

    /// Invalidate cache entry
    fn invalidate(&self, key: &Self::Key);

    /// Clear entire cache
    fn clear_cache(&self);

    /// Get cache statistics
    fn cache_stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
