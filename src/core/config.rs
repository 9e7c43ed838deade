//! Configuration for tile fetching, caching and eviction
//!
//! Tune a layer either through one of the [`TileFetchProfile`] presets or by
//! building a [`TileFetchConfig`] directly (including from JSON, where every
//! missing field falls back to the balanced default).

use crate::constants::{
    DEFAULT_KEEP_BUFFER, DEFAULT_MARGIN_LEVELS, DEFAULT_MAX_CONCURRENT_FETCHES,
    DEFAULT_MAX_TILES_PER_PASS, DEFAULT_MINIMUM_TILES_TO_KEEP, DEFAULT_RETENTION_MULTIPLIER,
};
use crate::{Result, TileError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum TileFetchProfile {
    Balanced,
    LowResource,
    HighPerformance,
    Custom(TileFetchConfig),
}

impl TileFetchProfile {
    pub fn resolve(&self) -> TileFetchConfig {
        match self {
            Self::Balanced => TileFetchConfig {
                margin_levels: DEFAULT_MARGIN_LEVELS,
                keep_buffer: DEFAULT_KEEP_BUFFER,
                max_tiles_per_pass: DEFAULT_MAX_TILES_PER_PASS,
                min_extra_tiles: 100,
                max_extra_tiles: 200,
                initial_min_tiles: 200,
                initial_max_tiles: 300,
                cleanup_after_passes: 3,
                absent_capacity: 4096,
                max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
                minimum_tiles_to_keep: DEFAULT_MINIMUM_TILES_TO_KEEP,
                retention_multiplier: DEFAULT_RETENTION_MULTIPLIER,
                fallback_max_levels_up: 8,
                fallback_to_children: true,
            },
            Self::LowResource => TileFetchConfig {
                margin_levels: 1,
                keep_buffer: 0,
                max_tiles_per_pass: 1024,
                min_extra_tiles: 20,
                max_extra_tiles: 50,
                initial_min_tiles: 50,
                initial_max_tiles: 100,
                cleanup_after_passes: 1,
                absent_capacity: 1024,
                max_concurrent_fetches: 2,
                minimum_tiles_to_keep: 64,
                retention_multiplier: 2,
                fallback_max_levels_up: 4,
                fallback_to_children: false,
            },
            Self::HighPerformance => TileFetchConfig {
                margin_levels: 4,
                keep_buffer: 2,
                max_tiles_per_pass: 16384,
                min_extra_tiles: 400,
                max_extra_tiles: 800,
                initial_min_tiles: 800,
                initial_max_tiles: 1200,
                cleanup_after_passes: 8,
                absent_capacity: 16384,
                max_concurrent_fetches: 16,
                minimum_tiles_to_keep: 1024,
                retention_multiplier: 4,
                fallback_max_levels_up: 12,
                fallback_to_children: true,
            },
            Self::Custom(config) => config.clone(),
        }
    }
}

impl Default for TileFetchProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Knobs of the tile fetch planner and its caches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileFetchConfig {
    /// Coarser levels added to the needed set above the visible level
    pub margin_levels: u8,
    /// Ring of tiles added around the visible range (prefetch-ahead)
    pub keep_buffer: u32,
    /// Needed-tile computations above this count fail with `AreaTooLarge`
    pub max_tiles_per_pass: u64,
    /// Memory cache floor above the needed-tile count
    pub min_extra_tiles: usize,
    /// Memory cache ceiling above the needed-tile count
    pub max_extra_tiles: usize,
    /// Memory cache floor before the first viewport arrives
    pub initial_min_tiles: usize,
    /// Memory cache ceiling before the first viewport arrives
    pub initial_max_tiles: usize,
    /// Passes a settled tile may stay outside the needed set before its
    /// fetch record is dropped
    pub cleanup_after_passes: u32,
    /// How many confirmed-absent coordinates are remembered
    pub absent_capacity: usize,
    /// Fetch slots used by the dispatcher
    pub max_concurrent_fetches: usize,
    /// Generational cache floor on retained entries
    pub minimum_tiles_to_keep: usize,
    /// Generational cache ceiling as a multiple of the entries of the current pass
    pub retention_multiplier: usize,
    /// How many coarser levels the render fallback searches
    pub fallback_max_levels_up: u8,
    /// Whether the render fallback may use finer cached tiles
    pub fallback_to_children: bool,
}

impl Default for TileFetchConfig {
    fn default() -> Self {
        TileFetchProfile::default().resolve()
    }
}

impl TileFetchConfig {
    /// Parse a configuration from JSON; missing fields take default values
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_tiles_per_pass == 0 {
            return Err(TileError::Config("max_tiles_per_pass must be positive".into()));
        }
        if self.max_extra_tiles < self.min_extra_tiles {
            return Err(TileError::Config(format!(
                "max_extra_tiles ({}) is below min_extra_tiles ({})",
                self.max_extra_tiles, self.min_extra_tiles
            )));
        }
        if self.initial_max_tiles == 0 || self.initial_max_tiles < self.initial_min_tiles {
            return Err(TileError::Config(format!(
                "initial tile window {}..{} is empty or inverted",
                self.initial_min_tiles, self.initial_max_tiles
            )));
        }
        if self.absent_capacity == 0 {
            return Err(TileError::Config("absent_capacity must be positive".into()));
        }
        if self.retention_multiplier == 0 {
            return Err(TileError::Config("retention_multiplier must be positive".into()));
        }
        Ok(())
    }

    /// Memory cache window `(min, max)` for a given needed-tile count
    pub fn memory_window(&self, needed_tiles: usize) -> (usize, usize) {
        (
            needed_tiles + self.min_extra_tiles,
            (needed_tiles + self.max_extra_tiles).max(1),
        )
    }
}
