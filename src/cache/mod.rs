//! Segment cache.
//!
//! Policy layer over the persistent segment store: admission (skip oversized
//! payloads), FIFO eviction between a high and a low water mark, and a
//! read-through lookup that never blocks playback for longer than the
//! configured read timeout.
//!
//! All storage failures degrade to "behave as if the cache were absent".

mod limits;
mod segment_cache;
mod stats;

pub use limits::CacheLimits;
pub use segment_cache::SegmentCache;
pub use stats::{CacheStats, EvictionReport};
