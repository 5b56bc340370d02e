//! Segment cache data model.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A cached segment: the full payload stored under its URL.
///
/// Entries are never mutated after creation. Re-storing a key replaces the
/// entry wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: Bytes, stored_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            payload,
            stored_at,
        }
    }

    /// Payload length in bytes.
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Header of a stored entry, as produced by oldest-first scans.
///
/// Carries the payload size instead of the payload itself so eviction never
/// has to read blobs it is about to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub key: String,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

/// Convert epoch milliseconds (the on-disk timestamp format) into a UTC time.
///
/// Out-of-range values clamp to the Unix epoch.
pub fn from_epoch_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}
