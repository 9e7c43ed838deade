//! Spatial tile index: viewport → needed tiles
//!
//! Pure functions only. Identical inputs always produce the identical set,
//! with priorities ranking tiles of the visible level first and, within a
//! level, by distance of the tile center to the viewport center.

use crate::core::{config::TileFetchConfig, extent::Extent, geo::TileCoord, viewport::Viewport};
use crate::prelude::HashSet;
use crate::tiles::schema::{TileRange, TileSchema};
use crate::{Result, TileError};
use std::cmp::Ordering;

/// Widening and safety knobs of a needed-tile computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeededTileOptions {
    /// Coarser levels included above the visible level
    pub margin_levels: u8,
    /// Ring of tiles added around the visible range
    pub keep_buffer: u32,
    /// Computations touching more tiles than this are rejected
    pub max_tiles: u64,
}

impl Default for NeededTileOptions {
    fn default() -> Self {
        Self::from(&TileFetchConfig::default())
    }
}

impl From<&TileFetchConfig> for NeededTileOptions {
    fn from(config: &TileFetchConfig) -> Self {
        Self {
            margin_levels: config.margin_levels,
            keep_buffer: config.keep_buffer,
            max_tiles: config.max_tiles_per_pass,
        }
    }
}

/// One entry of the needed set; lower priority values are fetched first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeededTile {
    pub coord: TileCoord,
    pub priority: u32,
}

/// Result of [`compute_needed_tiles`]
#[derive(Debug, Clone, Default)]
pub struct NeededTiles {
    /// Level nearest to the requested resolution
    pub level: u8,
    /// Exact on-screen range at `level`, clipped to the schema
    pub visible: Option<TileRange>,
    /// All needed tiles, ordered by ascending priority
    pub tiles: Vec<NeededTile>,
    set: HashSet<TileCoord>,
}

impl NeededTiles {
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.set.contains(coord)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.tiles.iter().map(|t| t.coord)
    }

    /// Tiles of the exact on-screen range, row-major
    pub fn visible_coords(&self) -> Vec<TileCoord> {
        self.visible
            .map(|range| range.coords().collect())
            .unwrap_or_default()
    }

    pub fn as_set(&self) -> &HashSet<TileCoord> {
        &self.set
    }
}

/// Compute the tiles needed to cover `extent` at `resolution`.
///
/// The set always contains the exact on-screen range at the nearest level;
/// `keep_buffer` adds a ring of tiles around it and `margin_levels` adds the
/// covering tiles of that many coarser levels.
pub fn compute_needed_tiles(
    extent: &Extent,
    resolution: f64,
    schema: &TileSchema,
    options: &NeededTileOptions,
) -> Result<NeededTiles> {
    Viewport::new(*extent, resolution).validate()?;

    let Some(level) = schema.nearest_level(resolution) else {
        return Ok(NeededTiles::default());
    };
    let (Some(raw), Some(full)) = (schema.tile_range(extent, level), schema.full_range(level))
    else {
        return Ok(NeededTiles::default());
    };

    let buffered_raw = raw.expanded(options.keep_buffer);
    let requested = buffered_raw.count();
    if requested > options.max_tiles {
        return Err(TileError::AreaTooLarge {
            tiles: requested,
            limit: options.max_tiles,
        });
    }

    let visible = raw.intersection(&full);
    let buffered = buffered_raw.intersection(&full);
    let center = extent.center();

    // (level rank, distance², coord) for every candidate
    let mut ranked: Vec<(u8, f64, TileCoord)> = Vec::new();
    let mut push_range = |range: &TileRange, rank: u8| {
        for coord in range.coords() {
            let distance = schema
                .tile_extent(&coord)
                .map(|e| {
                    let c = e.center();
                    (c.x - center.x).powi(2) + (c.y - center.y).powi(2)
                })
                .unwrap_or(f64::MAX);
            ranked.push((rank, distance, coord));
        }
    };

    if !buffered.is_empty() {
        push_range(&buffered, 0);
    }
    for (i, coarser) in schema
        .coarser_levels(level)
        .take(options.margin_levels as usize)
        .enumerate()
    {
        let range = schema
            .tile_range(extent, coarser)
            .zip(schema.full_range(coarser))
            .map(|(r, f)| r.intersection(&f));
        if let Some(range) = range.filter(|r| !r.is_empty()) {
            push_range(&range, i as u8 + 1);
        }
    }

    ranked.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .then(a.2.cmp(&b.2))
    });

    let tiles: Vec<NeededTile> = ranked
        .into_iter()
        .enumerate()
        .map(|(priority, (_, _, coord))| NeededTile {
            coord,
            priority: priority as u32,
        })
        .collect();
    let set = tiles.iter().map(|t| t.coord).collect();

    log::trace!(
        "needed tiles at level {}: {} (visible {:?})",
        level,
        tiles.len(),
        visible
    );

    Ok(NeededTiles {
        level,
        visible: (!visible.is_empty()).then_some(visible),
        tiles,
        set,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MERCATOR_HALF_EXTENT;

    const H: f64 = MERCATOR_HALF_EXTENT;

    fn options(margin_levels: u8, keep_buffer: u32) -> NeededTileOptions {
        NeededTileOptions {
            margin_levels,
            keep_buffer,
            max_tiles: 4096,
        }
    }

    fn level_resolution(schema: &TileSchema, level: u8) -> f64 {
        schema.resolution(level).unwrap().units_per_pixel
    }

    #[test]
    fn test_exact_range_without_margin() {
        let schema = TileSchema::global_spherical_mercator();
        let extent = Extent::new(-H * 0.9, H * 0.1, H * 0.9, H * 0.9);
        let needed =
            compute_needed_tiles(&extent, level_resolution(&schema, 1), &schema, &options(0, 0))
                .unwrap();

        assert_eq!(needed.level, 1);
        let coords: Vec<_> = needed.coords().collect();
        assert_eq!(coords.len(), 2);
        assert!(needed.contains(&TileCoord::new(0, 0, 1)));
        assert!(needed.contains(&TileCoord::new(1, 0, 1)));
    }

    #[test]
    fn test_margin_strictly_contains_visible_range() {
        let schema = TileSchema::global_spherical_mercator();
        let resolution = level_resolution(&schema, 6);
        let extent = Extent::new(100_000.0, 100_000.0, 900_000.0, 700_000.0);

        let exact = compute_needed_tiles(&extent, resolution, &schema, &options(0, 0)).unwrap();
        let widened = compute_needed_tiles(&extent, resolution, &schema, &options(3, 1)).unwrap();

        assert!(widened.len() > exact.len());
        for coord in exact.coords() {
            assert!(widened.contains(&coord), "missing {}", coord);
        }
        for coord in exact.visible_coords() {
            assert!(widened.contains(&coord));
        }
        assert!(widened.coords().any(|c| c.level == 5));
        assert!(widened.coords().any(|c| c.level == 3));
        assert!(!widened.coords().any(|c| c.level == 2));
    }

    #[test]
    fn test_visible_level_ranked_first() {
        let schema = TileSchema::global_spherical_mercator();
        let extent = Extent::new(100_000.0, 100_000.0, 900_000.0, 700_000.0);
        let needed = compute_needed_tiles(
            &extent,
            level_resolution(&schema, 6),
            &schema,
            &options(2, 1),
        )
        .unwrap();

        let first_coarse = needed
            .tiles
            .iter()
            .position(|t| t.coord.level != 6)
            .unwrap();
        assert!(needed.tiles[..first_coarse].iter().all(|t| t.coord.level == 6));
        for (i, tile) in needed.tiles.iter().enumerate() {
            assert_eq!(tile.priority, i as u32);
        }

        // The tile under the viewport center is the first one fetched.
        let center_tile = schema.tile_at(&extent.center(), 6).unwrap();
        assert_eq!(needed.tiles[0].coord, center_tile);
    }

    #[test]
    fn test_deterministic() {
        let schema = TileSchema::global_spherical_mercator();
        let extent = Extent::new(-2_000_000.0, -1_000_000.0, 3_000_000.0, 2_000_000.0);
        let resolution = level_resolution(&schema, 5) * 1.1;
        let a = compute_needed_tiles(&extent, resolution, &schema, &options(3, 1)).unwrap();
        let b = compute_needed_tiles(&extent, resolution, &schema, &options(3, 1)).unwrap();
        assert_eq!(a.tiles, b.tiles);
        assert_eq!(a.as_set(), b.as_set());
    }

    #[test]
    fn test_area_too_large_rejected() {
        let schema = TileSchema::global_spherical_mercator();
        let err = compute_needed_tiles(
            &schema.extent,
            level_resolution(&schema, 12),
            &schema,
            &options(0, 0),
        )
        .unwrap_err();
        assert!(matches!(err, TileError::AreaTooLarge { limit: 4096, .. }));
    }

    #[test]
    fn test_huge_extent_rejected_without_overflow() {
        let schema = TileSchema::global_spherical_mercator();
        let extent = Extent::new(-1e21, -1e21, 1e21, 1e21);
        for buffer in [0, 2] {
            let err = compute_needed_tiles(
                &extent,
                level_resolution(&schema, 19),
                &schema,
                &options(0, buffer),
            )
            .unwrap_err();
            assert!(matches!(
                err,
                TileError::AreaTooLarge { tiles: u64::MAX, limit: 4096 }
            ));
        }
    }

    #[test]
    fn test_extent_outside_schema_is_empty() {
        let schema = TileSchema::global_spherical_mercator();
        let extent = Extent::new(3.0 * H, 3.0 * H, 3.5 * H, 3.5 * H);
        let needed = compute_needed_tiles(
            &extent,
            level_resolution(&schema, 2),
            &schema,
            &options(3, 0),
        )
        .unwrap();
        assert!(needed.is_empty());
        assert!(needed.visible.is_none());
    }

    #[test]
    fn test_invalid_resolution_rejected() {
        let schema = TileSchema::global_spherical_mercator();
        let extent = Extent::new(0.0, 0.0, 1.0, 1.0);
        assert!(matches!(
            compute_needed_tiles(&extent, -1.0, &schema, &options(0, 0)),
            Err(TileError::InvalidResolution(_))
        ));
    }
}
