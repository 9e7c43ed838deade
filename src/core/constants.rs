//! Core constants derived from common web-map tiling conventions.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Half the circumference of the WGS84 sphere in EPSG:3857 metres.
pub const MERCATOR_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// Number of zoom levels in the global spherical mercator schema (0..=19).
pub const MERCATOR_LEVEL_COUNT: u8 = 20;

/// Coarser levels fetched along with the visible level so placeholders exist.
pub const DEFAULT_MARGIN_LEVELS: u8 = 3;

/// Ring of extra tiles requested around the visible range.
pub const DEFAULT_KEEP_BUFFER: u32 = 1;

/// Upper bound on the tile count of a single needed-tile computation.
pub const DEFAULT_MAX_TILES_PER_PASS: u64 = 4096;

/// Generational cache floor on retained entries.
pub const DEFAULT_MINIMUM_TILES_TO_KEEP: usize = 256;

/// Generational cache retention ceiling as a multiple of the current pass.
pub const DEFAULT_RETENTION_MULTIPLIER: usize = 3;

/// Default concurrent fetch budget of a tile layer.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 6;
