//! Bounded caches used by the tile engine
//!
//! - [`lru::BoundedLru`]: fixed capacity, strict least-recently-used eviction
//! - [`memory::MemoryCache`]: LRU with a movable `(min, max)` capacity window
//! - [`generational::GenerationalCache`]: entries stamped with the render pass
//!   that last used them

pub mod generational;
pub mod lru;
pub mod memory;

pub use generational::GenerationalCache;
pub use lru::BoundedLru;
pub use memory::MemoryCache;
