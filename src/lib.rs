//! # Tileflow
//!
//! The tile-acquisition and cache-eviction engine behind a pannable,
//! zoomable map view.
//!
//! A [`TileLayer`] is told about every viewport change. It works out which
//! tiles the viewport needs, hands out bounded batches of fetch jobs to an
//! external executor, caches completed tiles under a viewport-sized memory
//! bound, and answers render queries with the best imagery it has, using
//! coarser (or finer) cached tiles while exact ones are still in flight.

pub mod cache;
pub mod core;
pub mod layers;
pub mod prelude;
pub mod rendering;
pub mod runtime;
pub mod tiles;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::{TileFetchConfig, TileFetchProfile},
    extent::Extent,
    geo::{Point, TileCoord},
    viewport::Viewport,
};

pub use crate::cache::{generational::GenerationalCache, lru::BoundedLru, memory::MemoryCache};

pub use crate::layers::{
    events::{EventBus, LayerEvent},
    tile::{
        FallbackOptions, FetchJob, FetchState, RenderSet, RenderTile, TileFeature,
        TileFetchDispatcher, TileFetchPlanner, TileImagery, TileLayer, TileLayerBuilder,
    },
};

pub use crate::tiles::{
    schema::{Resolution, TileSchema, YAxis},
    source::{FetchError, MemoryTileSource, TileFetchResult, TileSource},
};

pub use crate::rendering::frame_cache::FrameCache;

pub use crate::traits::{CacheStats, Cacheable, Release};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TileError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("viewport needs {tiles} tiles, more than the limit of {limit}")]
    AreaTooLarge { tiles: u64, limit: u64 },

    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    #[error("Invalid resolution: {0}")]
    InvalidResolution(f64),

    #[error("Cache invariant violated: {0}")]
    CacheInvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Error type alias for convenience
pub type Error = TileError;

/// Install `env_logger` as the `log` backend, honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
