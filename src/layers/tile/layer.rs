//! Core TileLayer implementation

use super::{
    dispatcher::TileFetchDispatcher,
    fallback::{self, FallbackOptions},
    planner::TileFetchPlanner,
    types::{FetchJob, FetchState, RenderSet, TileFeature},
};
use crate::{
    cache::memory::MemoryCache,
    core::{
        config::{TileFetchConfig, TileFetchProfile},
        extent::Extent,
        geo::TileCoord,
        viewport::Viewport,
    },
    layers::events::{EventBus, LayerEvent},
    prelude::Arc,
    tiles::{
        schema::TileSchema,
        source::{TileFetchResult, TileSource},
    },
    traits::{CacheStats, ReleaseHook},
    Result,
};
use crossbeam_channel::Receiver;

/// A tiled raster layer: owns the memory cache, the fetch planner and the
/// event bus for one tile schema.
///
/// The layer does not fetch by itself. Pair it with a
/// [`TileFetchDispatcher`] (see [`TileLayer::dispatcher`]) or drive
/// [`get_fetch_jobs`](Self::get_fetch_jobs) /
/// [`on_fetch_completed`](Self::on_fetch_completed) from your own executor.
pub struct TileLayer {
    id: String,
    schema: Arc<TileSchema>,
    config: TileFetchConfig,
    cache: Arc<MemoryCache<TileCoord, Arc<TileFeature>>>,
    planner: Arc<TileFetchPlanner>,
    events: Arc<EventBus>,
}

impl TileLayer {
    /// Create a layer with the balanced profile
    pub fn new(id: impl Into<String>, schema: TileSchema) -> Result<Self> {
        Self::builder(id, schema).build()
    }

    pub fn builder(id: impl Into<String>, schema: TileSchema) -> TileLayerBuilder {
        TileLayerBuilder::new(id, schema)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self) -> &TileSchema {
        &self.schema
    }

    pub fn config(&self) -> &TileFetchConfig {
        &self.config
    }

    /// Tell the layer the visible area changed. Effects are observed through
    /// [`LayerEvent`]s and [`busy`](Self::busy).
    pub fn viewport_changed(&self, extent: Extent, resolution: f64) {
        self.planner.viewport_changed(extent, resolution);
    }

    /// Convenience wrapper over [`viewport_changed`](Self::viewport_changed)
    pub fn set_viewport(&self, viewport: &Viewport) {
        self.viewport_changed(viewport.extent, viewport.resolution);
    }

    /// Best available imagery for the tiles covering `extent`. Never
    /// schedules a fetch. Rejected extents yield an empty set.
    pub fn get_features(&self, extent: &Extent, resolution: f64) -> RenderSet {
        let options = FallbackOptions::from(&self.config);
        match fallback::resolve(extent, resolution, &self.schema, &self.cache, &options) {
            Ok(set) => set,
            Err(err) => {
                log::warn!("layer {}: no features for request: {}", self.id, err);
                RenderSet::default()
            }
        }
    }

    pub fn get_fetch_jobs(&self, active_fetches: usize, available_fetch_slots: usize) -> Vec<FetchJob> {
        self.planner.get_fetch_jobs(active_fetches, available_fetch_slots)
    }

    pub fn on_fetch_completed(&self, coord: TileCoord, result: TileFetchResult) {
        self.planner.on_fetch_completed(coord, result);
    }

    /// True while a tile of the current viewport is being fetched
    pub fn busy(&self) -> bool {
        self.planner.busy()
    }

    pub fn state_of(&self, coord: &TileCoord) -> Option<FetchState> {
        self.planner.state_of(coord)
    }

    pub fn subscribe(&self) -> Receiver<LayerEvent> {
        self.events.subscribe()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn planner(&self) -> &Arc<TileFetchPlanner> {
        &self.planner
    }

    /// Cached tile, if present, marking it recently used
    pub fn cached_tile(&self, coord: &TileCoord) -> Option<Arc<TileFeature>> {
        self.cache.get(coord)
    }

    /// Dispatcher fetching this layer's tiles from `source` with
    /// `max_concurrent_fetches` slots
    pub fn dispatcher(&self, source: Arc<dyn TileSource>) -> TileFetchDispatcher {
        TileFetchDispatcher::new(
            self.planner.clone(),
            source,
            self.config.max_concurrent_fetches,
        )
    }

    /// Release every cached tile and forget all fetch state. The layer stops
    /// accepting work afterwards.
    pub fn dispose(&self) {
        log::debug!("disposing layer {}", self.id);
        self.planner.dispose();
        self.cache.clear();
    }
}

/// Builder for [`TileLayer`]
pub struct TileLayerBuilder {
    id: String,
    schema: TileSchema,
    profile: TileFetchProfile,
    release: Option<ReleaseHook<Arc<TileFeature>>>,
}

impl TileLayerBuilder {
    pub fn new(id: impl Into<String>, schema: TileSchema) -> Self {
        Self {
            id: id.into(),
            schema,
            profile: TileFetchProfile::default(),
            release: None,
        }
    }

    /// Use one of the preset profiles
    pub fn with_profile(mut self, profile: TileFetchProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Use an explicit configuration
    pub fn with_config(self, config: TileFetchConfig) -> Self {
        self.with_profile(TileFetchProfile::Custom(config))
    }

    /// Called with every tile leaving the memory cache
    pub fn with_release_hook(
        mut self,
        hook: impl Fn(Arc<TileFeature>) + Send + Sync + 'static,
    ) -> Self {
        self.release = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<TileLayer> {
        let config = self.profile.resolve();
        config.validate()?;

        let mut cache = MemoryCache::new(config.initial_min_tiles, config.initial_max_tiles)?;
        if let Some(release) = self.release {
            cache = cache.with_release_hook(move |tile| release(tile));
        }
        let cache = Arc::new(cache);
        let schema = Arc::new(self.schema);
        let events = Arc::new(EventBus::new());
        let planner = Arc::new(TileFetchPlanner::new(
            schema.clone(),
            config.clone(),
            cache.clone(),
            events.clone(),
        )?);

        log::debug!(
            "layer {} on schema {} with {} levels",
            self.id,
            schema.name,
            schema.resolutions.len()
        );

        Ok(TileLayer {
            id: self.id,
            schema,
            config,
            cache,
            planner,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = TileFetchConfig {
            max_extra_tiles: 1,
            min_extra_tiles: 2,
            ..TileFetchConfig::default()
        };
        let result = TileLayer::builder("osm", TileSchema::global_spherical_mercator())
            .with_config(config)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_dispose_releases_cached_tiles() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let layer = TileLayer::builder("osm", TileSchema::global_spherical_mercator())
            .with_profile(TileFetchProfile::LowResource)
            .with_release_hook(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let schema = TileSchema::global_spherical_mercator();
        let resolution = schema.resolution(1).unwrap().units_per_pixel;
        layer.viewport_changed(schema.extent, resolution);
        let jobs = layer.get_fetch_jobs(0, 16);
        assert!(!jobs.is_empty());
        for job in &jobs {
            layer.on_fetch_completed(job.coord, Ok(Some(vec![1])));
        }
        assert!(layer.cache_stats().size > 0);

        layer.dispose();
        assert_eq!(released.load(Ordering::SeqCst), jobs.len());
        assert_eq!(layer.cache_stats().size, 0);
        assert!(layer.get_fetch_jobs(0, 16).is_empty());
    }

    #[test]
    fn test_rejected_extent_gives_empty_render_set() {
        let layer = TileLayer::new("osm", TileSchema::global_spherical_mercator()).unwrap();
        let set = layer.get_features(&Extent::new(1.0, 1.0, 0.0, 0.0), 10.0);
        assert!(set.is_empty());
    }
}
