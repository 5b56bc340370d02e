use std::sync::atomic::{AtomicU64, Ordering};

use segcache_common::SegmentRecord;
use serde::Serialize;

use super::CacheLimits;

/// Running counters for diagnostics. Not part of any invariant.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub admitted: AtomicU64,
    pub rejected: AtomicU64,
    pub evicted: AtomicU64,
    pub write_failures: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Point-in-time view of the cache, served by the diagnostics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub available: bool,
    pub total_bytes: u64,
    /// `None` when the store is unavailable or the count query failed.
    pub entries: Option<u64>,
    pub limits: CacheLimits,
    pub hits: u64,
    pub misses: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub write_failures: u64,
}

impl CacheStats {
    pub(crate) fn collect(
        available: bool,
        total_bytes: u64,
        entries: Option<u64>,
        limits: CacheLimits,
        counters: &Counters,
    ) -> Self {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        Self {
            available,
            total_bytes,
            entries,
            limits,
            hits: load(&counters.hits),
            misses: load(&counters.misses),
            admitted: load(&counters.admitted),
            rejected: load(&counters.rejected),
            evicted: load(&counters.evicted),
            write_failures: load(&counters.write_failures),
        }
    }
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Removed entries, in the order they were removed.
    pub removed: Vec<SegmentRecord>,
    pub reclaimed_bytes: u64,
    /// The scan ran out of entries before reaching the target.
    pub exhausted: bool,
}
