//! Bounded persistent segment cache.
//!
//! One instance per player session. The cache exclusively owns the store
//! handle; everything else talks to it through `fetch`/`admit`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use segcache_common::{CacheEntry, Error, Result};
use segcache_db::store::{SegmentStore, SqliteStore};
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

use super::stats::Counters;
use super::{CacheLimits, CacheStats, EvictionReport};
use crate::config::CacheConfig;

/// Thread-safe, persistent cache for media segment payloads.
pub struct SegmentCache {
    /// `None` once opening the store failed; the cache is then a permanent no-op.
    store: Option<Arc<dyn SegmentStore>>,
    limits: CacheLimits,
    /// Running sum of stored payload sizes. Tracked incrementally and allowed
    /// to drift briefly under concurrent admissions.
    total_bytes: Arc<AtomicU64>,
    /// Serializes eviction passes and resets.
    eviction: Mutex<()>,
    /// Background admissions started by the loader interceptor.
    pending: TaskTracker,
    counters: Counters,
}

impl SegmentCache {
    /// Open the configured store and build a cache around it.
    ///
    /// Never fails: a disabled cache, a missing path, or a store that cannot
    /// be opened all produce an unavailable cache whose operations are no-ops.
    pub async fn initialize(config: &CacheConfig) -> Self {
        let limits = CacheLimits::from(config);

        if !config.enabled {
            tracing::info!("Segment cache disabled by configuration");
            return Self::unavailable(limits);
        }

        let Some(db_path) = config.resolved_db_path() else {
            tracing::error!("{}", Error::store_unavailable("no database path configured"));
            return Self::unavailable(limits);
        };

        let opened = tokio::task::spawn_blocking(move || open_sqlite(&db_path))
            .await
            .map_err(|e| Error::store_unavailable(format!("store open task failed: {e}")))
            .and_then(|r| r);

        match opened {
            Ok(store) => Self::with_store(Arc::new(store), limits).await,
            Err(e) => {
                tracing::error!("Video caching disabled: {}", e);
                Self::unavailable(limits)
            }
        }
    }

    /// Build a cache over an already-open store.
    ///
    /// `total_bytes` is seeded from the store so a restarted session starts
    /// from the real occupancy.
    pub async fn with_store(store: Arc<dyn SegmentStore>, limits: CacheLimits) -> Self {
        let seed = Arc::clone(&store);
        let seeded = tokio::task::spawn_blocking(move || {
            let count = seed.count()?;
            let total = seed.total_bytes()?;
            Ok::<_, Error>((count, total))
        })
        .await;

        let total = match seeded {
            Ok(Ok((count, total))) => {
                tracing::info!("Cache contains {} segments ({} bytes)", count, total);
                total
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to read cache occupancy, starting from zero: {}", e);
                0
            }
            Err(e) => {
                tracing::warn!("Cache occupancy task failed, starting from zero: {}", e);
                0
            }
        };

        Self {
            store: Some(store),
            limits,
            total_bytes: Arc::new(AtomicU64::new(total)),
            eviction: Mutex::new(()),
            pending: TaskTracker::new(),
            counters: Counters::default(),
        }
    }

    /// A cache with no store. Every lookup misses and every admission is dropped.
    pub fn unavailable(limits: CacheLimits) -> Self {
        Self {
            store: None,
            limits,
            total_bytes: Arc::new(AtomicU64::new(0)),
            eviction: Mutex::new(()),
            pending: TaskTracker::new(),
            counters: Counters::default(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn limits(&self) -> &CacheLimits {
        &self.limits
    }

    /// Current running byte total.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Acquire)
    }

    /// Look up a payload. Read errors and slow reads are misses.
    ///
    /// Only reads committed writes; never evicts.
    pub async fn fetch(&self, key: &str) -> Option<Bytes> {
        let store = self.store.clone()?;
        let owned = key.to_owned();
        let lookup = tokio::task::spawn_blocking(move || store.get(&owned));

        let found = match tokio::time::timeout(self.limits.read_timeout, lookup).await {
            Ok(Ok(Ok(found))) => found,
            Ok(Ok(Err(e))) => {
                tracing::warn!("Cache error retrieving {}: {}", key, e);
                None
            }
            Ok(Err(e)) => {
                tracing::warn!("Cache lookup task failed for {}: {}", key, e);
                None
            }
            Err(_) => {
                tracing::debug!(
                    "Cache lookup for {} exceeded {:?}, treating as miss",
                    key,
                    self.limits.read_timeout
                );
                None
            }
        };

        match found {
            Some(payload) => {
                Counters::bump(&self.counters.hits);
                tracing::debug!("Cache hit: {} ({} bytes)", key, payload.len());
                Some(Bytes::from(payload))
            }
            None => {
                Counters::bump(&self.counters.misses);
                tracing::trace!("Cache miss: {}", key);
                None
            }
        }
    }

    /// Admission policy: store `payload` under `key` unless it is empty or
    /// larger than the per-item ceiling.
    ///
    /// If occupancy is already above the high-water mark, an eviction pass
    /// down to the low-water mark runs first. The byte total is only bumped
    /// after the write is durable.
    pub async fn admit(&self, key: &str, payload: Bytes, observed_at: DateTime<Utc>) {
        let Some(store) = self.store.clone() else {
            return;
        };

        let size = payload.len() as u64;
        if size == 0 {
            return;
        }
        if size > self.limits.per_item_ceiling_bytes {
            Counters::bump(&self.counters.rejected);
            tracing::debug!(
                "Skipping {}: {} bytes exceeds per-item ceiling of {}",
                key,
                size,
                self.limits.per_item_ceiling_bytes
            );
            return;
        }

        if self.total_bytes() > self.limits.high_water_mark_bytes {
            let _guard = self.eviction.lock().await;
            // Another admission may have evicted while we waited.
            if self.total_bytes() > self.limits.high_water_mark_bytes {
                self.run_eviction(self.limits.low_water_mark_bytes).await;
            }
        }

        let entry = CacheEntry::new(key, payload, observed_at);
        match tokio::task::spawn_blocking(move || store.put(&entry)).await {
            Ok(Ok(previous)) => {
                self.total_bytes.fetch_add(size, Ordering::AcqRel);
                if let Some(previous) = previous {
                    release(&self.total_bytes, previous);
                }
                Counters::bump(&self.counters.admitted);
                tracing::trace!("Stored segment: {} ({} bytes)", key, size);
            }
            Ok(Err(e)) => {
                Counters::bump(&self.counters.write_failures);
                tracing::warn!("Error storing segment {}: {}", key, e);
            }
            Err(e) => {
                Counters::bump(&self.counters.write_failures);
                tracing::warn!("Store task failed for {}: {}", key, e);
            }
        }
    }

    /// Run [`admit`](Self::admit) on a tracked background task so the caller
    /// never waits on storage.
    pub fn admit_in_background(self: &Arc<Self>, key: String, payload: Bytes) {
        if !self.is_available() {
            return;
        }
        let cache = Arc::clone(self);
        let observed_at = Utc::now();
        self.pending.spawn(async move {
            cache.admit(&key, payload, observed_at).await;
        });
    }

    /// Delete entries oldest-first until the byte total is at or below
    /// `low_water_mark_bytes` or the store runs out of entries.
    pub async fn evict_until_under_target(&self, low_water_mark_bytes: u64) -> EvictionReport {
        let _guard = self.eviction.lock().await;
        self.run_eviction(low_water_mark_bytes).await
    }

    /// Caller must hold the eviction lock.
    async fn run_eviction(&self, target: u64) -> EvictionReport {
        let Some(store) = self.store.clone() else {
            return EvictionReport::default();
        };
        let total = Arc::clone(&self.total_bytes);

        let report = match tokio::task::spawn_blocking(move || {
            evict_oldest_first(store.as_ref(), &total, target)
        })
        .await
        {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Eviction task failed: {}", e);
                return EvictionReport::default();
            }
        };

        if report.removed.is_empty() {
            tracing::debug!("Cache cleanup: nothing to remove");
            return report;
        }

        Counters::add(&self.counters.evicted, report.removed.len() as u64);
        tracing::info!(
            "Cache cleanup: removed {} segments ({:.2}MB)",
            report.removed.len(),
            report.reclaimed_bytes as f64 / 1024.0 / 1024.0
        );
        report
    }

    /// Remove every entry and zero the byte total.
    ///
    /// Returns how many entries were removed.
    pub async fn reset(&self) -> Result<u64> {
        let Some(store) = self.store.clone() else {
            return Ok(0);
        };
        let _guard = self.eviction.lock().await;

        let removed = tokio::task::spawn_blocking(move || store.clear())
            .await
            .map_err(|e| Error::internal(format!("clear task failed: {e}")))??;

        self.total_bytes.store(0, Ordering::Release);
        tracing::info!("Cache cleared ({} segments)", removed);
        Ok(removed)
    }

    /// Number of stored entries, for diagnostics.
    pub async fn count(&self) -> Option<u64> {
        let store = self.store.clone()?;
        match tokio::task::spawn_blocking(move || store.count()).await {
            Ok(Ok(count)) => Some(count),
            Ok(Err(e)) => {
                tracing::warn!("Failed to count cached segments: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("Count task failed: {}", e);
                None
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats::collect(
            self.is_available(),
            self.total_bytes(),
            self.count().await,
            self.limits,
            &self.counters,
        )
    }

    /// Wait for background admissions started so far.
    ///
    /// Called when a session ends; the cache stays usable afterwards.
    pub async fn flush(&self) {
        self.pending.close();
        self.pending.wait().await;
        self.pending.reopen();
    }
}

fn open_sqlite(db_path: &Path) -> Result<SqliteStore> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::store_unavailable(format!("cannot create {}: {e}", parent.display()))
        })?;
    }
    let store = SqliteStore::open(&db_path.to_string_lossy())?;
    tracing::info!("Segment store opened at {}", db_path.display());
    Ok(store)
}

/// Saturating subtract from the running total.
fn release(total: &AtomicU64, bytes: u64) {
    let _ = total.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(current.saturating_sub(bytes))
    });
}

fn evict_oldest_first(store: &dyn SegmentStore, total: &AtomicU64, target: u64) -> EvictionReport {
    let mut report = EvictionReport::default();
    let mut scan = store.iter_oldest_first();

    while total.load(Ordering::Acquire) > target {
        let record = match scan.next() {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                tracing::warn!("Eviction scan failed: {}", e);
                break;
            }
            None => {
                report.exhausted = true;
                break;
            }
        };

        match store.delete(&record.key) {
            Ok(Some(size)) => {
                release(total, size);
                report.reclaimed_bytes += size;
                report.removed.push(record);
            }
            // Already gone.
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to evict {}: {}", record.key, e),
        }
    }
    drop(scan);

    if report.exhausted {
        // The running total drifted above what is actually stored.
        match store.total_bytes() {
            Ok(actual) => total.store(actual, Ordering::Release),
            Err(e) => tracing::warn!("Failed to resync cache occupancy: {}", e),
        }
    }

    report
}
