//! Iteration-stamped cache for per-render-pass artifacts
//!
//! Entries carry the iteration (render pass number) they were last used in
//! rather than a recency position. [`GenerationalCache::update_cache`] keeps
//! everything used in the current pass plus a bounded number of older
//! entries, dropping the oldest iterations first. Entries may therefore age
//! a few passes before they are reclaimed, which smooths out passes that
//! briefly touch fewer entries.

use crate::constants::{DEFAULT_MINIMUM_TILES_TO_KEEP, DEFAULT_RETENTION_MULTIPLIER};
use crate::prelude::HashMap;
use crate::traits::{release_hook, Release, ReleaseHook};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Entry<V> {
    value: V,
    iteration: i64,
}

pub struct GenerationalCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    minimum_to_keep: usize,
    retention_multiplier: usize,
    release: Option<ReleaseHook<V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> GenerationalCache<K, V> {
    pub fn new(minimum_to_keep: usize, retention_multiplier: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::default()),
            minimum_to_keep,
            retention_multiplier,
            release: None,
        }
    }

    /// Release removed values through their [`Release`] implementation
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

    /// Return the cached value for `key`, creating it with `factory` on a
    /// miss. Either way the entry is stamped with `iteration`.
    ///
    /// The factory runs under the cache lock and must not call back into
    /// this cache. A factory that panics leaves the cache unchanged.
    pub fn get_or_add(&self, key: K, factory: impl FnOnce() -> V, iteration: i64) -> V {
        let mut entries = self.lock_entries();
        let entry = entries.entry(key).or_insert_with(|| Entry {
            value: factory(),
            iteration,
        });
        entry.iteration = iteration;
        entry.value.clone()
    }

    /// Look up a value without stamping it
    pub fn peek(&self, key: &K) -> Option<V> {
        self.lock_entries()
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Iteration an entry was last stamped with
    pub fn iteration_of(&self, key: &K) -> Option<i64> {
        self.lock_entries().get(key).map(|entry| entry.iteration)
    }

    /// Trim entries not used in `current_iteration`.
    ///
    /// The cache retains `max(minimum_to_keep, current * retention_multiplier)`
    /// entries in total, where `current` counts the entries stamped with
    /// `current_iteration`. Older entries beyond that budget are removed,
    /// oldest iteration first. Returns the number of removed entries.
    pub fn update_cache(&self, current_iteration: i64) -> usize {
        if current_iteration <= 0 {
            return 0;
        }

        let removed: Vec<V> = {
            let mut entries = self.lock_entries();
            if entries.is_empty() {
                return 0;
            }

            let current = entries
                .values()
                .filter(|entry| entry.iteration >= current_iteration)
                .count();
            let ceiling = self
                .minimum_to_keep
                .max(current.saturating_mul(self.retention_multiplier));
            let allowed_old = ceiling.saturating_sub(current);
            let old = entries.len() - current;
            if old <= allowed_old {
                return 0;
            }

            let mut candidates: Vec<(i64, K)> = entries
                .iter()
                .filter(|(_, entry)| entry.iteration < current_iteration)
                .map(|(key, entry)| (entry.iteration, key.clone()))
                .collect();
            candidates.sort_by_key(|(iteration, _)| *iteration);

            candidates
                .into_iter()
                .take(old - allowed_old)
                .filter_map(|(_, key)| entries.remove(&key))
                .map(|entry| entry.value)
                .collect()
        };

        let count = removed.len();
        log::trace!(
            "generational cache dropped {} entries at iteration {}",
            count,
            current_iteration
        );
        self.release_all(removed);
        count
    }

    /// Release every value and empty the cache
    pub fn clear(&self) {
        let drained: Vec<V> = self
            .lock_entries()
            .drain()
            .map(|(_, entry)| entry.value)
            .collect();
        self.release_all(drained);
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries are only mutated after a factory returns, so a lock poisoned
    /// by a panicking factory still guards a consistent map.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            log::warn!("generational cache lock poisoned, recovering");
            self.entries.clear_poison();
            poisoned.into_inner()
        })
    }

    fn release_all(&self, values: Vec<V>) {
        if let Some(release) = &self.release {
            values.into_iter().for_each(|value| release(value));
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> Default for GenerationalCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_MINIMUM_TILES_TO_KEEP, DEFAULT_RETENTION_MULTIPLIER)
    }
}

impl<K, V> Drop for GenerationalCache<K, V> {
    fn drop(&mut self) {
        let Some(release) = self.release.take() else {
            return;
        };
        self.entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .for_each(|(_, entry)| release(entry.value));
    }
}
