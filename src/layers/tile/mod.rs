//! Tile layer: fetch planning, render fallback and fetch dispatch
//!
//! - [`planner`]: per-tile fetch state machine and bounded job scheduling
//! - [`fallback`]: best cached imagery for each on-screen tile
//! - [`dispatcher`]: runs fetch jobs against a [`crate::TileSource`]
//! - [`layer`]: ties the above to a memory cache and an event bus

pub mod dispatcher;
pub mod fallback;
pub mod layer;
pub mod planner;
pub mod types;

pub use dispatcher::TileFetchDispatcher;
pub use fallback::FallbackOptions;
pub use layer::{TileLayer, TileLayerBuilder};
pub use planner::TileFetchPlanner;
pub use types::{FetchJob, FetchState, RenderSet, RenderTile, TileFeature, TileImagery};
