//! Tile schemas: how a projected plane is cut into tiles per resolution level
//!
//! A schema is supplied by the host and is read-only to the engine. All
//! tile-space arithmetic (extent → tile range, tile → extent, point → tile)
//! lives here so the index, the planner and the render fallback agree on it.

use crate::constants::{MERCATOR_HALF_EXTENT, MERCATOR_LEVEL_COUNT, TILE_SIZE};
use crate::core::{extent::Extent, geo::Point, geo::TileCoord};
use crate::{Result, TileError};
use serde::{Deserialize, Serialize};

/// Direction rows are counted in, relative to the schema origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YAxis {
    /// Rows grow upwards from a bottom-left origin (TMS)
    Normal,
    /// Rows grow downwards from a top-left origin (OSM / XYZ)
    InvertedY,
}

/// One resolution level of a schema
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub level: u8,
    /// World units covered by one pixel at this level
    pub units_per_pixel: f64,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl Resolution {
    pub fn new(level: u8, units_per_pixel: f64, tile_width: u32, tile_height: u32) -> Self {
        Self {
            level,
            units_per_pixel,
            tile_width,
            tile_height,
        }
    }

    /// Width of one tile in world units
    pub fn tile_world_width(&self) -> f64 {
        self.tile_width as f64 * self.units_per_pixel
    }

    /// Height of one tile in world units
    pub fn tile_world_height(&self) -> f64 {
        self.tile_height as f64 * self.units_per_pixel
    }
}

/// Inclusive rectangle of tile columns and rows at one level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub level: u8,
    pub min_col: i64,
    pub max_col: i64,
    pub min_row: i64,
    pub max_row: i64,
}

impl TileRange {
    /// Number of tiles in the range, saturating on absurd ranges
    pub fn count(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let cols = self.max_col.abs_diff(self.min_col).saturating_add(1);
        let rows = self.max_row.abs_diff(self.min_row).saturating_add(1);
        cols.saturating_mul(rows)
    }

    pub fn is_empty(&self) -> bool {
        self.max_col < self.min_col || self.max_row < self.min_row
    }

    /// Grow the range by `tiles` on every side
    pub fn expanded(&self, tiles: u32) -> TileRange {
        let n = tiles as i64;
        TileRange {
            level: self.level,
            min_col: self.min_col.saturating_sub(n),
            max_col: self.max_col.saturating_add(n),
            min_row: self.min_row.saturating_sub(n),
            max_row: self.max_row.saturating_add(n),
        }
    }

    /// Overlap of two ranges of the same level
    pub fn intersection(&self, other: &TileRange) -> TileRange {
        TileRange {
            level: self.level,
            min_col: self.min_col.max(other.min_col),
            max_col: self.max_col.min(other.max_col),
            min_row: self.min_row.max(other.min_row),
            max_row: self.max_row.min(other.max_row),
        }
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        coord.level == self.level
            && (self.min_col..=self.max_col).contains(&(coord.col as i64))
            && (self.min_row..=self.max_row).contains(&(coord.row as i64))
    }

    /// Every coordinate in the range, row-major
    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let level = self.level;
        (self.min_row..=self.max_row).flat_map(move |row| {
            (self.min_col..=self.max_col)
                .map(move |col| TileCoord::new(col as i32, row as i32, level))
        })
    }
}

/// Resolution levels plus the extent and origin of the tile matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSchema {
    pub name: String,
    /// Sorted by ascending level; level numbers are unique
    pub resolutions: Vec<Resolution>,
    pub extent: Extent,
    pub origin: Point,
    pub y_axis: YAxis,
}

impl TileSchema {
    pub fn new(
        name: impl Into<String>,
        mut resolutions: Vec<Resolution>,
        extent: Extent,
        origin: Point,
        y_axis: YAxis,
    ) -> Result<Self> {
        if resolutions.is_empty() {
            return Err(TileError::Config("tile schema has no resolutions".into()));
        }
        if !extent.is_valid() {
            return Err(TileError::InvalidExtent(format!("{:?}", extent)));
        }
        if let Some(bad) = resolutions.iter().find(|r| {
            !(r.units_per_pixel.is_finite() && r.units_per_pixel > 0.0)
                || r.tile_width == 0
                || r.tile_height == 0
        }) {
            return Err(TileError::Config(format!("invalid resolution level {}", bad.level)));
        }
        resolutions.sort_by_key(|r| r.level);
        if resolutions.windows(2).any(|w| w[0].level == w[1].level) {
            return Err(TileError::Config("duplicate resolution level".into()));
        }

        Ok(Self {
            name: name.into(),
            resolutions,
            extent,
            origin,
            y_axis,
        })
    }

    /// The EPSG:3857 schema used by OSM-style tile servers: 20 levels of
    /// 256 px tiles, origin at the top-left corner of the world.
    pub fn global_spherical_mercator() -> Self {
        let world = 2.0 * MERCATOR_HALF_EXTENT;
        let resolutions = (0..MERCATOR_LEVEL_COUNT)
            .map(|level| {
                let upp = world / TILE_SIZE as f64 / 2_f64.powi(level as i32);
                Resolution::new(level, upp, TILE_SIZE, TILE_SIZE)
            })
            .collect();

        Self {
            name: "GlobalSphericalMercator".to_string(),
            resolutions,
            extent: Extent::new(
                -MERCATOR_HALF_EXTENT,
                -MERCATOR_HALF_EXTENT,
                MERCATOR_HALF_EXTENT,
                MERCATOR_HALF_EXTENT,
            ),
            origin: Point::new(-MERCATOR_HALF_EXTENT, MERCATOR_HALF_EXTENT),
            y_axis: YAxis::InvertedY,
        }
    }

    pub fn resolution(&self, level: u8) -> Option<&Resolution> {
        self.resolutions
            .binary_search_by_key(&level, |r| r.level)
            .ok()
            .map(|i| &self.resolutions[i])
    }

    /// Level whose units-per-pixel is nearest to `resolution`; ties go to the
    /// finer level.
    pub fn nearest_level(&self, resolution: f64) -> Option<u8> {
        self.resolutions
            .iter()
            .min_by(|a, b| {
                let da = (a.units_per_pixel - resolution).abs();
                let db = (b.units_per_pixel - resolution).abs();
                da.total_cmp(&db)
                    .then(a.units_per_pixel.total_cmp(&b.units_per_pixel))
            })
            .map(|r| r.level)
    }

    /// Levels coarser than `level`, nearest first
    pub fn coarser_levels(&self, level: u8) -> impl Iterator<Item = u8> + '_ {
        self.resolutions
            .iter()
            .rev()
            .filter(move |r| r.level < level)
            .map(|r| r.level)
    }

    /// The next finer level after `level`, if any
    pub fn finer_level(&self, level: u8) -> Option<u8> {
        self.resolutions
            .iter()
            .find(|r| r.level > level)
            .map(|r| r.level)
    }

    /// Tiles touched by `extent` at `level`, not clipped to the schema.
    /// Partially covered tiles are included.
    pub fn tile_range(&self, extent: &Extent, level: u8) -> Option<TileRange> {
        let res = self.resolution(level)?;
        let w = res.tile_world_width();
        let h = res.tile_world_height();

        let min_col = ((extent.min_x - self.origin.x) / w).floor();
        let max_col = ((extent.max_x - self.origin.x) / w).ceil() - 1.0;
        let (min_row, max_row) = match self.y_axis {
            YAxis::InvertedY => (
                ((self.origin.y - extent.max_y) / h).floor(),
                ((self.origin.y - extent.min_y) / h).ceil() - 1.0,
            ),
            YAxis::Normal => (
                ((extent.min_y - self.origin.y) / h).floor(),
                ((extent.max_y - self.origin.y) / h).ceil() - 1.0,
            ),
        };

        // A degenerate (zero-width) extent still touches one tile.
        let min_col = min_col as i64;
        let min_row = min_row as i64;
        Some(TileRange {
            level,
            min_col,
            max_col: (max_col as i64).max(min_col),
            min_row,
            max_row: (max_row as i64).max(min_row),
        })
    }

    /// All tiles the schema defines at `level`
    pub fn full_range(&self, level: u8) -> Option<TileRange> {
        // Shrink slightly so tiles merely touching the schema edge are left out.
        let inset = self
            .resolution(level)?
            .units_per_pixel
            .min(self.extent.width() / 4.0)
            .min(self.extent.height() / 4.0)
            * 1e-3;
        let inner = Extent::new(
            self.extent.min_x + inset,
            self.extent.min_y + inset,
            self.extent.max_x - inset,
            self.extent.max_y - inset,
        );
        self.tile_range(&inner, level)
    }

    /// World extent covered by a tile
    pub fn tile_extent(&self, coord: &TileCoord) -> Option<Extent> {
        let res = self.resolution(coord.level)?;
        let w = res.tile_world_width();
        let h = res.tile_world_height();
        let min_x = self.origin.x + coord.col as f64 * w;

        let (min_y, max_y) = match self.y_axis {
            YAxis::InvertedY => {
                let max_y = self.origin.y - coord.row as f64 * h;
                (max_y - h, max_y)
            }
            YAxis::Normal => {
                let min_y = self.origin.y + coord.row as f64 * h;
                (min_y, min_y + h)
            }
        };
        Some(Extent::new(min_x, min_y, min_x + w, max_y))
    }

    /// The schema tile at `level` containing `point`
    pub fn tile_at(&self, point: &Point, level: u8) -> Option<TileCoord> {
        let range = self.tile_range(&Extent::new(point.x, point.y, point.x, point.y), level)?;
        let coord = TileCoord::new(range.min_col as i32, range.min_row as i32, level);
        self.contains(&coord).then_some(coord)
    }

    /// Whether the coordinate lies inside the schema's tile matrix
    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.full_range(coord.level)
            .map(|range| range.contains(coord))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mercator_levels() {
        let schema = TileSchema::global_spherical_mercator();
        assert_eq!(schema.resolutions.len(), 20);
        let level0 = schema.resolution(0).unwrap();
        assert!((level0.units_per_pixel - 156_543.033_928_041).abs() < 1e-6);
        let level1 = schema.resolution(1).unwrap();
        assert!((level0.units_per_pixel / level1.units_per_pixel - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_full_range_per_level() {
        let schema = TileSchema::global_spherical_mercator();
        let range = schema.full_range(2).unwrap();
        assert_eq!((range.min_col, range.max_col), (0, 3));
        assert_eq!((range.min_row, range.max_row), (0, 3));
        assert_eq!(range.count(), 16);
    }

    #[test]
    fn test_count_saturates_on_full_i64_span() {
        let range = TileRange {
            level: 19,
            min_col: i64::MIN,
            max_col: i64::MAX,
            min_row: 0,
            max_row: 0,
        };
        assert_eq!(range.count(), u64::MAX);
        assert_eq!(range.expanded(3).count(), u64::MAX);
    }

    #[test]
    fn test_nearest_level_ties_go_finer() {
        let schema = TileSchema::new(
            "test",
            vec![
                Resolution::new(0, 4.0, 256, 256),
                Resolution::new(1, 2.0, 256, 256),
            ],
            Extent::new(0.0, 0.0, 1024.0, 1024.0),
            Point::new(0.0, 1024.0),
            YAxis::InvertedY,
        )
        .unwrap();
        assert_eq!(schema.nearest_level(3.0), Some(1));
        assert_eq!(schema.nearest_level(3.5), Some(0));
        assert_eq!(schema.nearest_level(100.0), Some(0));
        assert_eq!(schema.nearest_level(0.1), Some(1));
    }

    #[test]
    fn test_tile_extent_round_trip() {
        let schema = TileSchema::global_spherical_mercator();
        let coord = TileCoord::new(1, 0, 1);
        let extent = schema.tile_extent(&coord).unwrap();
        assert_eq!(extent.min_x, 0.0);
        assert_eq!(extent.max_y, MERCATOR_HALF_EXTENT);
        assert_eq!(schema.tile_at(&extent.center(), 1), Some(coord));
    }

    #[test]
    fn test_normal_y_axis_rows_grow_upwards() {
        let schema = TileSchema::new(
            "tms",
            vec![Resolution::new(0, 1.0, 10, 10)],
            Extent::new(0.0, 0.0, 100.0, 100.0),
            Point::new(0.0, 0.0),
            YAxis::Normal,
        )
        .unwrap();
        assert_eq!(
            schema.tile_at(&Point::new(5.0, 95.0), 0),
            Some(TileCoord::new(0, 9, 0))
        );
        let range = schema
            .tile_range(&Extent::new(5.0, 5.0, 25.0, 15.0), 0)
            .unwrap();
        assert_eq!((range.min_col, range.max_col), (0, 2));
        assert_eq!((range.min_row, range.max_row), (0, 1));
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let extent = Extent::new(0.0, 0.0, 1.0, 1.0);
        assert!(TileSchema::new("e", vec![], extent, Point::default(), YAxis::Normal).is_err());
        assert!(TileSchema::new(
            "d",
            vec![Resolution::new(0, 1.0, 1, 1), Resolution::new(0, 0.5, 1, 1)],
            extent,
            Point::default(),
            YAxis::Normal
        )
        .is_err());
    }
}
