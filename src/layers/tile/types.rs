//! Core data types for tile layer functionality

use crate::core::{extent::Extent, geo::TileCoord};
use crate::prelude::{Arc, HashSet};
use serde::{Deserialize, Serialize};

/// Fetch lifecycle of one tile coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchState {
    NotRequested,
    /// Handed out by `get_fetch_jobs`, completion not yet reported
    Pending,
    /// Fetched and inserted into the memory cache
    Ready,
    /// Transient failure; retried when a later pass still needs the tile
    Failed,
    /// The source reported the tile does not exist; never retried
    ConfirmedAbsent,
}

impl FetchState {
    /// Whether a pass needing this tile should schedule a fetch
    pub fn wants_fetch(self) -> bool {
        matches!(self, FetchState::NotRequested | FetchState::Failed)
    }
}

/// A unit of fetch work; lower priority values are nearer the viewport center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchJob {
    pub coord: TileCoord,
    pub priority: u32,
}

/// A fetched tile as stored in the memory cache
#[derive(Debug, Clone, PartialEq)]
pub struct TileFeature {
    /// Unique per layer; stable key for per-frame render artifacts
    pub id: u64,
    pub coord: TileCoord,
    pub extent: Extent,
    pub data: Arc<Vec<u8>>,
}

impl TileFeature {
    pub fn new(id: u64, coord: TileCoord, extent: Extent, data: Vec<u8>) -> Self {
        Self {
            id,
            coord,
            extent,
            data: Arc::new(data),
        }
    }
}

/// What the renderer should draw for one needed tile
#[derive(Debug, Clone, PartialEq)]
pub enum TileImagery {
    /// The tile itself
    Exact(Arc<TileFeature>),
    /// A coarser tile covering this one, to be drawn scaled up
    Ancestor(Arc<TileFeature>),
    /// Finer tiles covering parts of this one
    Descendants(Vec<Arc<TileFeature>>),
    /// Nothing cached; draw transparent
    Blank,
}

impl TileImagery {
    pub fn is_exact(&self) -> bool {
        matches!(self, TileImagery::Exact(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, TileImagery::Blank)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTile {
    pub coord: TileCoord,
    pub extent: Extent,
    pub imagery: TileImagery,
}

/// Best available imagery for every on-screen tile of a viewport
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSet {
    pub level: u8,
    pub tiles: Vec<RenderTile>,
}

impl RenderSet {
    pub fn get(&self, coord: &TileCoord) -> Option<&RenderTile> {
        self.tiles.iter().find(|tile| tile.coord == *coord)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn exact_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.imagery.is_exact()).count()
    }

    pub fn blank_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.imagery.is_blank()).count()
    }

    /// Distinct features to draw, coarsest first so finer imagery paints over
    /// placeholders. An ancestor shared by several tiles appears once.
    pub fn features(&self) -> Vec<Arc<TileFeature>> {
        let mut seen = HashSet::default();
        let mut features: Vec<Arc<TileFeature>> = self
            .tiles
            .iter()
            .flat_map(|tile| match &tile.imagery {
                TileImagery::Exact(f) | TileImagery::Ancestor(f) => vec![f.clone()],
                TileImagery::Descendants(fs) => fs.clone(),
                TileImagery::Blank => Vec::new(),
            })
            .filter(|f| seen.insert(f.id))
            .collect();
        features.sort_by_key(|f| (f.coord.level, f.id));
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(id: u64, coord: TileCoord) -> Arc<TileFeature> {
        Arc::new(TileFeature::new(
            id,
            coord,
            Extent::new(0.0, 0.0, 1.0, 1.0),
            vec![id as u8],
        ))
    }

    #[test]
    fn test_features_dedup_shared_ancestor() {
        let parent = feature(1, TileCoord::new(0, 0, 0));
        let exact = feature(2, TileCoord::new(1, 0, 1));
        let tile = |coord, imagery| RenderTile {
            coord,
            extent: Extent::new(0.0, 0.0, 1.0, 1.0),
            imagery,
        };
        let set = RenderSet {
            level: 1,
            tiles: vec![
                tile(TileCoord::new(0, 0, 1), TileImagery::Ancestor(parent.clone())),
                tile(TileCoord::new(1, 0, 1), TileImagery::Exact(exact.clone())),
                tile(TileCoord::new(0, 1, 1), TileImagery::Ancestor(parent.clone())),
                tile(TileCoord::new(1, 1, 1), TileImagery::Blank),
            ],
        };

        let ids: Vec<u64> = set.features().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(set.exact_count(), 1);
        assert_eq!(set.blank_count(), 1);
        assert!(set.get(&TileCoord::new(1, 1, 1)).is_some());
    }

    #[test]
    fn test_only_not_requested_and_failed_want_fetch() {
        assert!(FetchState::NotRequested.wants_fetch());
        assert!(FetchState::Failed.wants_fetch());
        assert!(!FetchState::Pending.wants_fetch());
        assert!(!FetchState::Ready.wants_fetch());
        assert!(!FetchState::ConfirmedAbsent.wants_fetch());
    }
}
