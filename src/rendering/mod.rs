pub mod frame_cache;

pub use frame_cache::FrameCache;
