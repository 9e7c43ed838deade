//! Prelude module for common tileflow types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use tileflow::prelude::*;`

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
    index::{compute_needed_tiles, NeededTile, NeededTiles},
    schema::{Resolution, TileSchema, YAxis},
    source::{FetchError, MemoryTileSource, TileFetchResult, TileSource},
};

pub use crate::rendering::frame_cache::FrameCache;

pub use crate::runtime::{AsyncHandle, AsyncSpawner};

pub use crate::traits::{CacheStats, Cacheable, Release};

pub use crate::{Error as TileError, Result};

pub use std::{
    pin::Pin,
    sync::{Arc, Mutex},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::Future;
