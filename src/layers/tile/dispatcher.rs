//! Reference executor for the pull-based fetch API
//!
//! The planner only decides *what* to fetch. The dispatcher pulls jobs,
//! runs them against a [`TileSource`] and reports completions, keeping an
//! atomic count of fetches in flight which it feeds back into
//! `get_fetch_jobs`. Every job it takes is reported back exactly once, even
//! when the source panics or the dispatcher is shut down.

use super::{planner::TileFetchPlanner, types::FetchJob};
use crate::core::geo::TileCoord;
use crate::prelude::{Arc, Mutex};
use crate::runtime::{AsyncHandle, AsyncSpawner};
use crate::tiles::source::{FetchError, TileFetchResult, TileSource};
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A spawned fetch. `settled` is claimed by whoever reports the job first,
/// the task itself or [`TileFetchDispatcher::shutdown`].
struct InFlight {
    coord: TileCoord,
    settled: Arc<AtomicBool>,
    handle: Box<dyn AsyncHandle>,
}

pub struct TileFetchDispatcher {
    planner: Arc<TileFetchPlanner>,
    source: Arc<dyn TileSource>,
    slots: usize,
    active: AtomicUsize,
    /// Serializes job pulls so two pumps never overshoot the slot count
    pump_lock: Mutex<()>,
    in_flight: Mutex<Vec<InFlight>>,
}

impl TileFetchDispatcher {
    pub fn new(planner: Arc<TileFetchPlanner>, source: Arc<dyn TileSource>, slots: usize) -> Self {
        Self {
            planner,
            source,
            slots,
            active: AtomicUsize::new(0),
            pump_lock: Mutex::new(()),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Fetches currently in flight
    pub fn active_fetches(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Spawn fetches for every free slot. Each finished fetch reports its
    /// result and pumps again, so one call keeps the pipeline full until the
    /// planner runs out of jobs. Returns the number of fetches started.
    pub fn pump(self: &Arc<Self>, spawner: &Arc<dyn AsyncSpawner>) -> usize {
        let jobs = self.take_jobs();
        let started = jobs.len();

        let spawned: Vec<InFlight> = jobs
            .into_iter()
            .map(|job| {
                let this = Arc::clone(self);
                let next = Arc::clone(spawner);
                let settled = Arc::new(AtomicBool::new(false));
                let claim = Arc::clone(&settled);
                let handle = spawner.spawn_boxed(Box::pin(async move {
                    let result = this.fetch(job.coord).await;
                    if !claim.swap(true, Ordering::SeqCst) {
                        this.complete(job.coord, result);
                    }
                    this.pump(&next);
                }));
                InFlight {
                    coord: job.coord,
                    settled,
                    handle,
                }
            })
            .collect();

        if let Ok(mut tracked) = self.in_flight.lock() {
            tracked.retain(|fetch| !fetch.settled.load(Ordering::SeqCst));
            tracked.extend(spawned);
        }
        if started > 0 {
            log::trace!(
                "{}: started {} fetches, {} in flight",
                self.source.name(),
                started,
                self.active_fetches()
            );
        }
        started
    }

    /// Run fetch rounds on the current task until the planner has no more
    /// jobs for this pass. Returns the number of completed fetches.
    pub async fn drain(&self) -> usize {
        let mut completed = 0;
        loop {
            let jobs = self.take_jobs();
            if jobs.is_empty() {
                break;
            }
            let results = join_all(jobs.iter().map(|job| self.fetch(job.coord))).await;
            for (job, result) in jobs.iter().zip(results) {
                self.complete(job.coord, result);
            }
            completed += jobs.len();
        }
        log::debug!("{}: drained {} fetches", self.source.name(), completed);
        completed
    }

    /// Abort spawned fetches that are still running. Each aborted job is
    /// reported to the planner as a failed fetch, so its tile is retried on
    /// a later pass instead of staying Pending.
    pub fn shutdown(&self) {
        let Ok(mut tracked) = self.in_flight.lock() else {
            return;
        };
        let aborted: Vec<TileCoord> = tracked
            .drain(..)
            .filter(|fetch| !fetch.settled.swap(true, Ordering::SeqCst))
            .map(|fetch| {
                fetch.handle.cancel();
                fetch.coord
            })
            .collect();
        drop(tracked);

        if !aborted.is_empty() {
            log::debug!("{}: cancelled {} fetches", self.source.name(), aborted.len());
        }
        for coord in aborted {
            self.complete(coord, Err(FetchError::new(coord, "cancelled")));
        }
    }

    /// Fetch one tile, turning a panicking source into a transient failure
    async fn fetch(&self, coord: TileCoord) -> TileFetchResult {
        match AssertUnwindSafe(self.source.fetch_tile(coord))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::new(coord, "tile source panicked")),
        }
    }

    fn complete(&self, coord: TileCoord, result: TileFetchResult) {
        self.planner.on_fetch_completed(coord, result);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn take_jobs(&self) -> Vec<FetchJob> {
        let Ok(_guard) = self.pump_lock.lock() else {
            return Vec::new();
        };
        let jobs = self
            .planner
            .get_fetch_jobs(self.active.load(Ordering::SeqCst), self.slots);
        self.active.fetch_add(jobs.len(), Ordering::SeqCst);
        jobs
    }
}
