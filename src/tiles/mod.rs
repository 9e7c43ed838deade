pub mod index;
pub mod schema;
pub mod source;

// Re-exports for convenience
pub use index::{compute_needed_tiles, NeededTile, NeededTileOptions, NeededTiles};
pub use schema::{Resolution, TileRange, TileSchema, YAxis};
pub use source::{FetchError, MemoryTileSource, TileFetchResult, TileSource};
