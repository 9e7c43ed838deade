//! Per-frame cache of prepared render artifacts
//!
//! A renderer turns each [`TileFeature`] into something drawable (a decoded
//! image, an uploaded texture) once and reuses it on later frames. Entries
//! are keyed by feature id and aged by frame number through a
//! [`GenerationalCache`], so artifacts of tiles that scrolled away for a
//! frame or two are kept while long-unused ones are released.

use crate::cache::generational::GenerationalCache;
use crate::core::config::TileFetchConfig;
use crate::layers::tile::types::{RenderSet, TileFeature};
use crate::traits::Release;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct FrameCache<P> {
    artifacts: GenerationalCache<u64, P>,
    frame: AtomicI64,
}

impl<P: Clone> FrameCache<P> {
    pub fn new(minimum_to_keep: usize, retention_multiplier: usize) -> Self {
        Self {
            artifacts: GenerationalCache::new(minimum_to_keep, retention_multiplier),
            frame: AtomicI64::new(0),
        }
    }

    pub fn from_config(config: &TileFetchConfig) -> Self {
        Self::new(config.minimum_tiles_to_keep, config.retention_multiplier)
    }

    /// Release trimmed artifacts through their [`Release`] implementation
    pub fn with_release(self) -> Self
    where
        P: Release + 'static,
    {
        Self {
            artifacts: self.artifacts.with_release(),
            frame: self.frame,
        }
    }

    pub fn with_release_hook(self, hook: impl Fn(P) + Send + Sync + 'static) -> Self {
        Self {
            artifacts: self.artifacts.with_release_hook(hook),
            frame: self.frame,
        }
    }

    /// Start a new frame and return its number
    pub fn begin_frame(&self) -> i64 {
        self.frame.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_frame(&self) -> i64 {
        self.frame.load(Ordering::SeqCst)
    }

    /// Artifact for `feature`, preparing it on first use in any frame
    pub fn prepare(&self, feature: &TileFeature, build: impl FnOnce(&TileFeature) -> P) -> P {
        self.artifacts
            .get_or_add(feature.id, || build(feature), self.current_frame())
    }

    /// Prepare every feature of a render set, coarsest first
    pub fn prepare_all(
        &self,
        set: &RenderSet,
        mut build: impl FnMut(&TileFeature) -> P,
    ) -> Vec<P> {
        set.features()
            .iter()
            .map(|feature| self.prepare(feature, &mut build))
            .collect()
    }

    /// Finish the current frame, trimming artifacts no longer worth keeping.
    /// Returns how many were released.
    pub fn end_frame(&self) -> usize {
        self.artifacts.update_cache(self.current_frame())
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn clear(&self) {
        self.artifacts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{extent::Extent, geo::TileCoord};
    use crate::prelude::Arc;
    use std::sync::atomic::AtomicUsize;

    fn feature(id: u64) -> TileFeature {
        TileFeature::new(
            id,
            TileCoord::new(id as i32, 0, 5),
            Extent::new(0.0, 0.0, 1.0, 1.0),
            vec![id as u8],
        )
    }

    #[test]
    fn test_artifacts_reused_across_frames() {
        let frames = FrameCache::new(4, 2);
        let builds = AtomicUsize::new(0);
        let build = |f: &TileFeature| {
            builds.fetch_add(1, Ordering::SeqCst);
            format!("texture-{}", f.id)
        };

        for _ in 0..3 {
            frames.begin_frame();
            assert_eq!(frames.prepare(&feature(1), build), "texture-1");
            frames.end_frame();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(frames.current_frame(), 3);
    }

    #[test]
    fn test_unused_artifacts_released_after_frames() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let frames = FrameCache::new(2, 1).with_release_hook(move |_: u64| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        frames.begin_frame();
        for id in 0..6 {
            frames.prepare(&feature(id), |f| f.id);
        }
        assert_eq!(frames.end_frame(), 0);

        frames.begin_frame();
        frames.prepare(&feature(0), |f| f.id);
        // keep max(2, 1) = 2 entries: the current one plus one older
        assert_eq!(frames.end_frame(), 4);
        assert_eq!(released.load(Ordering::SeqCst), 4);
        assert_eq!(frames.len(), 2);
    }
}
