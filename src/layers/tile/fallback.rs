//! Render fallback: best cached imagery for each on-screen tile
//!
//! Lookups only. Nothing here schedules a fetch; a tile that is neither
//! cached nor covered by a cached ancestor or descendants renders blank.

use crate::cache::memory::MemoryCache;
use crate::core::{config::TileFetchConfig, extent::Extent, geo::TileCoord};
use crate::layers::tile::types::{RenderSet, RenderTile, TileFeature, TileImagery};
use crate::prelude::Arc;
use crate::tiles::{
    index::{compute_needed_tiles, NeededTileOptions},
    schema::TileSchema,
};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackOptions {
    /// How many coarser levels to search for an ancestor
    pub max_levels_up: u8,
    /// Use cached tiles one level finer when no ancestor is cached
    pub use_descendants: bool,
    /// Reject extents touching more tiles than this
    pub max_tiles: u64,
}

impl From<&TileFetchConfig> for FallbackOptions {
    fn from(config: &TileFetchConfig) -> Self {
        Self {
            max_levels_up: config.fallback_max_levels_up,
            use_descendants: config.fallback_to_children,
            max_tiles: config.max_tiles_per_pass,
        }
    }
}

impl Default for FallbackOptions {
    fn default() -> Self {
        Self::from(&TileFetchConfig::default())
    }
}

/// Resolve the imagery for every tile covering `extent` at the level nearest
/// to `resolution`.
///
/// Per tile, in order: the exact cached tile, the nearest cached ancestor,
/// the cached children (if enabled), otherwise [`TileImagery::Blank`].
pub fn resolve(
    extent: &Extent,
    resolution: f64,
    schema: &TileSchema,
    cache: &MemoryCache<TileCoord, Arc<TileFeature>>,
    options: &FallbackOptions,
) -> Result<RenderSet> {
    let visible_only = NeededTileOptions {
        margin_levels: 0,
        keep_buffer: 0,
        max_tiles: options.max_tiles,
    };
    let needed = compute_needed_tiles(extent, resolution, schema, &visible_only)?;

    let tiles = needed
        .visible_coords()
        .into_iter()
        .filter_map(|coord| {
            let extent = schema.tile_extent(&coord)?;
            let imagery = resolve_tile(&coord, &extent, schema, cache, options);
            Some(RenderTile {
                coord,
                extent,
                imagery,
            })
        })
        .collect();

    Ok(RenderSet {
        level: needed.level,
        tiles,
    })
}

fn resolve_tile(
    coord: &TileCoord,
    extent: &Extent,
    schema: &TileSchema,
    cache: &MemoryCache<TileCoord, Arc<TileFeature>>,
    options: &FallbackOptions,
) -> TileImagery {
    if let Some(feature) = cache.get(coord) {
        return TileImagery::Exact(feature);
    }
    if let Some(ancestor) = find_ancestor(coord, extent, schema, cache, options.max_levels_up) {
        return TileImagery::Ancestor(ancestor);
    }
    if options.use_descendants {
        let children = find_descendants(coord, extent, schema, cache);
        if !children.is_empty() {
            return TileImagery::Descendants(children);
        }
    }
    TileImagery::Blank
}

/// Nearest cached tile at a coarser level that covers `extent`
pub fn find_ancestor(
    coord: &TileCoord,
    extent: &Extent,
    schema: &TileSchema,
    cache: &MemoryCache<TileCoord, Arc<TileFeature>>,
    max_levels_up: u8,
) -> Option<Arc<TileFeature>> {
    let center = extent.center();
    schema
        .coarser_levels(coord.level)
        .take(max_levels_up as usize)
        .filter_map(|level| schema.tile_at(&center, level))
        .find_map(|parent| cache.get(&parent))
}

/// Cached tiles one level finer lying inside `extent`
pub fn find_descendants(
    coord: &TileCoord,
    extent: &Extent,
    schema: &TileSchema,
    cache: &MemoryCache<TileCoord, Arc<TileFeature>>,
) -> Vec<Arc<TileFeature>> {
    let Some(level) = schema.finer_level(coord.level) else {
        return Vec::new();
    };
    // Pull the edges in so neighbours merely touching the tile are skipped.
    let inset = extent.width().min(extent.height()) * 1e-6;
    let inner = Extent::new(
        extent.min_x + inset,
        extent.min_y + inset,
        extent.max_x - inset,
        extent.max_y - inset,
    );
    let range = schema
        .tile_range(&inner, level)
        .zip(schema.full_range(level))
        .map(|(range, full)| range.intersection(&full));

    range
        .map(|range| {
            range
                .coords()
                .filter(|child| cache.contains(child))
                .filter_map(|child| cache.get(&child))
                .collect()
        })
        .unwrap_or_default()
}
