//! Fetch scheduling for one tile layer
//!
//! The planner tracks a [`FetchState`] per tile coordinate and hands out
//! bounded batches of [`FetchJob`]s. It never performs I/O: an external
//! executor pulls jobs with [`TileFetchPlanner::get_fetch_jobs`], runs them,
//! and reports back through [`TileFetchPlanner::on_fetch_completed`].
//!
//! All bookkeeping happens under a single lock per planner. Events are
//! published after the lock is released.

use crate::cache::{lru::BoundedLru, memory::MemoryCache};
use crate::core::{config::TileFetchConfig, extent::Extent, geo::TileCoord, viewport::Viewport};
use crate::layers::events::{EventBus, LayerEvent};
use crate::layers::tile::types::{FetchJob, FetchState, TileFeature};
use crate::prelude::{Arc, HashMap, Mutex};
use crate::tiles::{
    index::{compute_needed_tiles, NeededTileOptions, NeededTiles},
    schema::TileSchema,
    source::TileFetchResult,
};
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy)]
struct TileRecord {
    state: FetchState,
    priority: u32,
    /// Pass in which the last fetch for this tile was issued
    attempted_pass: u64,
    /// Consecutive passes this tile was outside the needed set
    stale_passes: u32,
}

impl TileRecord {
    fn new(state: FetchState, priority: u32) -> Self {
        Self {
            state,
            priority,
            attempted_pass: 0,
            stale_passes: 0,
        }
    }
}

#[derive(Default)]
struct PlannerState {
    pass: u64,
    viewport: Option<Viewport>,
    needed: NeededTiles,
    records: HashMap<TileCoord, TileRecord>,
    /// Tiles became Ready since the last `viewport_changed`
    new_data: bool,
    busy: bool,
    disposed: bool,
}

impl PlannerState {
    /// Whether `record` may be handed out in the current pass. A failed tile
    /// gets one attempt per pass.
    fn eligible(&self, record: &TileRecord) -> bool {
        match record.state {
            FetchState::NotRequested => true,
            FetchState::Failed => record.attempted_pass < self.pass,
            _ => false,
        }
    }

    /// Recompute the busy flag; returns the new value if it flipped
    fn refresh_busy(&mut self) -> Option<bool> {
        let busy = self.needed.coords().any(|coord| {
            self.records
                .get(&coord)
                .is_some_and(|r| r.state == FetchState::Pending)
        });
        (busy != self.busy).then(|| {
            self.busy = busy;
            busy
        })
    }

    fn pending_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.state == FetchState::Pending)
            .count()
    }
}

/// Per-layer fetch state machine and job scheduler
pub struct TileFetchPlanner {
    schema: Arc<TileSchema>,
    config: TileFetchConfig,
    cache: Arc<MemoryCache<TileCoord, Arc<TileFeature>>>,
    absent: BoundedLru<TileCoord, ()>,
    events: Arc<EventBus>,
    state: Mutex<PlannerState>,
    next_feature_id: AtomicU64,
}

impl TileFetchPlanner {
    pub fn new(
        schema: Arc<TileSchema>,
        config: TileFetchConfig,
        cache: Arc<MemoryCache<TileCoord, Arc<TileFeature>>>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;
        let absent = BoundedLru::new(config.absent_capacity)?;
        Ok(Self {
            schema,
            config,
            cache,
            absent,
            events,
            state: Mutex::new(PlannerState::default()),
            next_feature_id: AtomicU64::new(1),
        })
    }

    /// Recompute the needed-tile set for a new viewport.
    ///
    /// Newly needed tiles become eligible for fetching; tiles that left the
    /// set are forgotten after `cleanup_after_passes` passes unless a fetch
    /// for them is still in flight. A rejected viewport (too large, invalid)
    /// is logged and reported as `DataChanged { error }` and leaves the
    /// previous state untouched.
    pub fn viewport_changed(&self, extent: Extent, resolution: f64) {
        let options = NeededTileOptions::from(&self.config);
        let needed = match compute_needed_tiles(&extent, resolution, &self.schema, &options) {
            Ok(needed) => needed,
            Err(err) => {
                log::warn!("viewport rejected: {}", err);
                self.events.publish(LayerEvent::data_error(err.to_string()));
                return;
            }
        };

        // Shrinking the window may evict Ready tiles; the reconcile below
        // picks that up in the same pass.
        let (min_tiles, max_tiles) = self.config.memory_window(needed.len());
        if let Err(err) = self.cache.set_bounds(min_tiles, max_tiles) {
            log::warn!("memory cache window not updated: {}", err);
        }

        let mut events = Vec::new();
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.disposed {
                return;
            }
            state.pass += 1;
            let cleanup_after = self.config.cleanup_after_passes;

            for tile in &needed.tiles {
                let initial = self.initial_state(&tile.coord);
                let record = state
                    .records
                    .entry(tile.coord)
                    .or_insert_with(|| TileRecord::new(initial, tile.priority));
                record.priority = tile.priority;
                record.stale_passes = 0;
                match record.state {
                    FetchState::Ready if !self.cache.contains(&tile.coord) => {
                        log::trace!("tile {} evicted, fetching again", tile.coord);
                        record.state = FetchState::NotRequested;
                    }
                    FetchState::ConfirmedAbsent if !self.absent.contains(&tile.coord) => {
                        record.state = FetchState::NotRequested;
                    }
                    _ => {}
                }
            }

            state.records.retain(|coord, record| {
                if needed.contains(coord) || record.state == FetchState::Pending {
                    return true;
                }
                record.stale_passes += 1;
                record.stale_passes < cleanup_after
            });

            log::debug!(
                "pass {}: level {}, {} tiles needed, {} tracked, {} pending",
                state.pass,
                needed.level,
                needed.len(),
                state.records.len(),
                state.pending_count()
            );

            state.needed = needed;
            state.viewport = Some(Viewport::new(extent, resolution));
            if std::mem::take(&mut state.new_data) {
                events.push(LayerEvent::data_changed());
            }
            if let Some(busy) = state.refresh_busy() {
                events.push(LayerEvent::BusyChanged(busy));
            }
        }
        self.publish_all(events);
    }

    /// Hand out at most `available_fetch_slots - active_fetches` jobs,
    /// nearest to the viewport center first. Selected tiles become Pending
    /// immediately so repeated calls never return the same tile twice.
    pub fn get_fetch_jobs(&self, active_fetches: usize, available_fetch_slots: usize) -> Vec<FetchJob> {
        let budget = available_fetch_slots.saturating_sub(active_fetches);
        if budget == 0 {
            return Vec::new();
        }

        let mut events = Vec::new();
        let jobs = {
            let Ok(mut guard) = self.state.lock() else {
                return Vec::new();
            };
            let state = &mut *guard;
            if state.disposed {
                return Vec::new();
            }

            let mut jobs = Vec::with_capacity(budget.min(state.needed.len()));
            for tile in &state.needed.tiles {
                if jobs.len() >= budget {
                    break;
                }
                let Some(record) = state.records.get(&tile.coord) else {
                    continue;
                };
                if !state.eligible(record) {
                    continue;
                }
                let pass = state.pass;
                if let Some(record) = state.records.get_mut(&tile.coord) {
                    record.state = FetchState::Pending;
                    record.attempted_pass = pass;
                    jobs.push(FetchJob {
                        coord: tile.coord,
                        priority: record.priority,
                    });
                }
            }

            if let Some(busy) = state.refresh_busy() {
                events.push(LayerEvent::BusyChanged(busy));
            }
            jobs
        };

        if !jobs.is_empty() {
            log::trace!("issued {} fetch jobs", jobs.len());
        }
        self.publish_all(events);
        jobs
    }

    /// Record the outcome of a fetch.
    ///
    /// Bytes are cached and the tile becomes Ready, even if the tile is no
    /// longer needed. `Ok(None)` marks the tile confirmed absent. Errors mark
    /// it Failed and are reported as `DataChanged { error }`.
    pub fn on_fetch_completed(&self, coord: TileCoord, result: TileFetchResult) {
        if self.is_disposed() {
            log::trace!("dropping completion for {} after dispose", coord);
            return;
        }

        let (next, event) = match result {
            Ok(Some(bytes)) => match self.schema.tile_extent(&coord) {
                Some(extent) => {
                    let id = self.next_feature_id.fetch_add(1, Ordering::Relaxed);
                    self.cache
                        .put(coord, Arc::new(TileFeature::new(id, coord, extent, bytes)));
                    log::trace!("tile {} ready", coord);
                    (FetchState::Ready, Some(LayerEvent::data_changed()))
                }
                None => {
                    let message = format!("tile {} is outside schema {}", coord, self.schema.name);
                    log::warn!("{}", message);
                    (FetchState::Failed, Some(LayerEvent::data_error(message)))
                }
            },
            Ok(None) => {
                self.absent.put(coord, ());
                log::trace!("tile {} confirmed absent", coord);
                (FetchState::ConfirmedAbsent, None)
            }
            Err(err) => {
                log::warn!("{}", err);
                (FetchState::Failed, Some(LayerEvent::data_error(err.to_string())))
            }
        };

        let mut events: Vec<LayerEvent> = event.into_iter().collect();
        if let Ok(mut state) = self.state.lock() {
            match state.records.get_mut(&coord) {
                Some(record) => record.state = next,
                None => log::debug!("completion for untracked tile {}", coord),
            }
            if next == FetchState::Ready {
                state.new_data = true;
            }
            if let Some(busy) = state.refresh_busy() {
                events.push(LayerEvent::BusyChanged(busy));
            }
        }
        self.publish_all(events);
    }

    /// True while any tile of the current needed set is Pending
    pub fn busy(&self) -> bool {
        self.state.lock().map(|state| state.busy).unwrap_or(false)
    }

    pub fn state_of(&self, coord: &TileCoord) -> Option<FetchState> {
        self.state
            .lock()
            .ok()?
            .records
            .get(coord)
            .map(|record| record.state)
    }

    pub fn pending_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.pending_count())
            .unwrap_or(0)
    }

    /// Number of tiles in the current needed set
    pub fn needed_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.needed.len())
            .unwrap_or(0)
    }

    /// Number of coordinates with a fetch record
    pub fn tracked_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.records.len())
            .unwrap_or(0)
    }

    /// The last accepted viewport
    pub fn viewport(&self) -> Option<Viewport> {
        self.state.lock().ok()?.viewport
    }

    pub fn config(&self) -> &TileFetchConfig {
        &self.config
    }

    /// Forget every record and stop accepting work. Late completions are
    /// dropped.
    pub fn dispose(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = PlannerState {
                disposed: true,
                ..PlannerState::default()
            };
        }
        self.absent.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().map(|state| state.disposed).unwrap_or(true)
    }

    fn initial_state(&self, coord: &TileCoord) -> FetchState {
        if self.cache.contains(coord) {
            FetchState::Ready
        } else if self.absent.contains(coord) {
            FetchState::ConfirmedAbsent
        } else {
            FetchState::NotRequested
        }
    }

    fn publish_all(&self, events: Vec<LayerEvent>) {
        events.into_iter().for_each(|event| self.events.publish(event));
    }
}
