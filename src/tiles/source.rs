use crate::core::geo::TileCoord;
use crate::prelude::{HashMap, HashSet};
use async_trait::async_trait;
use std::sync::Mutex;

/// Transient failure of a tile fetch; the tile may be retried on a later pass
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fetching tile {coord} failed: {message}")]
pub struct FetchError {
    pub coord: TileCoord,
    pub message: String,
}

impl FetchError {
    pub fn new(coord: TileCoord, message: impl Into<String>) -> Self {
        Self {
            coord,
            message: message.into(),
        }
    }
}

/// Outcome of a tile fetch.
///
/// - `Ok(Some(bytes))`: the tile exists
/// - `Ok(None)`: the source authoritatively reports the tile does not exist;
///   it is never requested again. Sources must not use this for timeouts.
/// - `Err(_)`: transient failure
pub type TileFetchResult = std::result::Result<Option<Vec<u8>>, FetchError>;

/// Anything that can produce the bytes of a tile.
///
/// Transport, retry and backoff policy belong to the implementation; the
/// engine only bounds how many fetches are outstanding.
#[async_trait]
pub trait TileSource: Send + Sync {
    async fn fetch_tile(&self, coord: TileCoord) -> TileFetchResult;

    /// Human readable name used in log output
    fn name(&self) -> &str {
        "tile source"
    }
}

/// Sparse in-memory tile store.
///
/// Coordinates without bytes are confirmed absent; coordinates marked with
/// [`fail_next`](Self::fail_next) fail transiently once.
#[derive(Default)]
pub struct MemoryTileSource {
    tiles: Mutex<HashMap<TileCoord, Vec<u8>>>,
    failures: Mutex<HashSet<TileCoord>>,
    requests: Mutex<Vec<TileCoord>>,
}

impl MemoryTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_tile(self, coord: TileCoord, data: Vec<u8>) -> Self {
        self.insert(coord, data);
        self
    }

    pub fn insert(&self, coord: TileCoord, data: Vec<u8>) {
        if let Ok(mut tiles) = self.tiles.lock() {
            tiles.insert(coord, data);
        }
    }

    /// Make the next fetch of `coord` fail with a transient error
    pub fn fail_next(&self, coord: TileCoord) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(coord);
        }
    }

    /// Every coordinate fetched so far, in request order
    pub fn requests(&self) -> Vec<TileCoord> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// How many times `coord` was fetched
    pub fn request_count(&self, coord: &TileCoord) -> usize {
        self.requests
            .lock()
            .map(|requests| requests.iter().filter(|c| *c == coord).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TileSource for MemoryTileSource {
    async fn fetch_tile(&self, coord: TileCoord) -> TileFetchResult {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(coord);
        }

        let failed = self
            .failures
            .lock()
            .map(|mut failures| failures.remove(&coord))
            .unwrap_or(false);
        if failed {
            return Err(FetchError::new(coord, "injected failure"));
        }

        let tiles = self
            .tiles
            .lock()
            .map_err(|_| FetchError::new(coord, "tile store lock poisoned"))?;
        Ok(tiles.get(&coord).cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
