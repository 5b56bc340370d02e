use std::time::Duration;

use serde::Serialize;

use crate::config::CacheConfig;

/// Byte thresholds and timeouts the cache enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheLimits {
    pub capacity_bytes: u64,
    pub per_item_ceiling_bytes: u64,
    /// Admission evicts first when occupancy is strictly above this.
    pub high_water_mark_bytes: u64,
    /// Eviction stops once occupancy is at or below this.
    pub low_water_mark_bytes: u64,
    #[serde(skip)]
    pub read_timeout: Duration,
}

impl CacheLimits {
    /// Build limits from a capacity and water-mark fractions of it.
    pub fn new(
        capacity_bytes: u64,
        per_item_ceiling_bytes: u64,
        high_water_mark_fraction: f64,
        low_water_mark_fraction: f64,
    ) -> Self {
        let mark = |fraction: f64| (capacity_bytes as f64 * fraction).floor() as u64;
        Self {
            capacity_bytes,
            per_item_ceiling_bytes,
            high_water_mark_bytes: mark(high_water_mark_fraction),
            low_water_mark_bytes: mark(low_water_mark_fraction),
            read_timeout: Duration::from_millis(250),
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

impl From<&CacheConfig> for CacheLimits {
    fn from(config: &CacheConfig) -> Self {
        Self {
            capacity_bytes: config.capacity_bytes,
            per_item_ceiling_bytes: config.per_item_ceiling_bytes,
            high_water_mark_bytes: config.high_water_mark_bytes(),
            low_water_mark_bytes: config.low_water_mark_bytes(),
            read_timeout: config.read_timeout(),
        }
    }
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}
