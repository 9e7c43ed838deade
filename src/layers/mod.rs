pub mod events;
pub mod tile;

pub use events::{EventBus, LayerEvent};
pub use tile::{TileFetchDispatcher, TileFetchPlanner, TileLayer};
