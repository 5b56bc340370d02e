//! Persistent segment store.
//!
//! [`SegmentStore`] is the durable key-to-blob contract the segment cache is
//! built on. Calls are blocking; async callers run them on a blocking thread.
//! [`SqliteStore`] is the SQLite-backed implementation.

use std::collections::VecDeque;

use segcache_common::{CacheEntry, Result, SegmentRecord};

use crate::pool::{get_conn, init_memory_pool, init_pool, DbPool};
use crate::queries::segments::{self, ScanCursor};

/// Number of record headers fetched per page during oldest-first scans.
const SCAN_PAGE_SIZE: usize = 64;

/// Lazy, finite sequence of record headers in ascending `stored_at` order.
pub type OldestFirst<'a> = Box<dyn Iterator<Item = Result<SegmentRecord>> + Send + 'a>;

/// Durable storage for segment payloads keyed by URL.
pub trait SegmentStore: Send + Sync {
    /// Look up the payload for `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Upsert an entry (last write wins). Returns the size of the payload it
    /// replaced, if any. The write is durable once this returns `Ok`.
    fn put(&self, entry: &CacheEntry) -> Result<Option<u64>>;

    /// Remove one entry. Returns the size that was removed; absent keys are
    /// not an error.
    fn delete(&self, key: &str) -> Result<Option<u64>>;

    /// Remove all entries, returning how many were removed.
    fn clear(&self) -> Result<u64>;

    /// Start a fresh scan over entries, oldest first.
    ///
    /// The scan may be dropped at any point; deletions made while it is in
    /// progress do not disturb it.
    fn iter_oldest_first(&self) -> OldestFirst<'_>;

    /// Number of stored entries.
    fn count(&self) -> Result<u64>;

    /// Sum of stored payload sizes.
    fn total_bytes(&self) -> Result<u64>;
}

/// SQLite-backed [`SegmentStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `db_path`.
    ///
    /// Safe to call against an existing database; the schema is only created
    /// once. Any failure is [`segcache_common::Error::StoreUnavailable`].
    pub fn open(db_path: &str) -> Result<Self> {
        Ok(Self {
            pool: init_pool(db_path)?,
        })
    }

    /// Open an isolated in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            pool: init_memory_pool()?,
        })
    }
}

impl SegmentStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = get_conn(&self.pool)?;
        segments::get_payload(&conn, key)
    }

    fn put(&self, entry: &CacheEntry) -> Result<Option<u64>> {
        let conn = get_conn(&self.pool)?;
        segments::upsert(&conn, entry)
    }

    fn delete(&self, key: &str) -> Result<Option<u64>> {
        let conn = get_conn(&self.pool)?;
        segments::delete(&conn, key)
    }

    fn clear(&self) -> Result<u64> {
        let conn = get_conn(&self.pool)?;
        segments::clear(&conn)
    }

    fn iter_oldest_first(&self) -> OldestFirst<'_> {
        Box::new(PagedScan {
            pool: &self.pool,
            cursor: None,
            buffer: VecDeque::new(),
            done: false,
        })
    }

    fn count(&self) -> Result<u64> {
        let conn = get_conn(&self.pool)?;
        segments::count(&conn)
    }

    fn total_bytes(&self) -> Result<u64> {
        let conn = get_conn(&self.pool)?;
        segments::total_bytes(&conn)
    }
}

/// Keyset-paginated oldest-first scan.
///
/// A connection is only held while a page is being read, so callers can
/// delete through the same pool between items.
struct PagedScan<'a> {
    pool: &'a DbPool,
    cursor: Option<ScanCursor>,
    buffer: VecDeque<SegmentRecord>,
    done: bool,
}

impl PagedScan<'_> {
    fn fill(&mut self) -> Result<()> {
        let page = {
            let conn = get_conn(self.pool)?;
            segments::page_oldest_first(&conn, self.cursor, SCAN_PAGE_SIZE)?
        };

        if page.len() < SCAN_PAGE_SIZE {
            self.done = true;
        }
        if let Some((cursor, _)) = page.last() {
            self.cursor = Some(*cursor);
        }
        self.buffer.extend(page.into_iter().map(|(_, record)| record));
        Ok(())
    }
}

impl Iterator for PagedScan<'_> {
    type Item = Result<SegmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::{Duration, Utc};

    fn entry(key: &str, len: usize, offset_ms: i64) -> CacheEntry {
        CacheEntry::new(
            key,
            Bytes::from(vec![0xAB; len]),
            Utc::now() + Duration::milliseconds(offset_ms),
        )
    }

    #[test]
    fn test_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(&entry("seg_1.ts", 10, 0)).unwrap();

        assert_eq!(store.get("seg_1.ts").unwrap().unwrap(), vec![0xAB; 10]);
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.total_bytes().unwrap(), 10);
    }

    #[test]
    fn test_scan_spans_multiple_pages() {
        let store = SqliteStore::open_in_memory().unwrap();
        let total = SCAN_PAGE_SIZE * 2 + 5;
        for i in 0..total {
            store.put(&entry(&format!("seg_{i}.ts"), 1, i as i64)).unwrap();
        }

        let records: Vec<_> = store
            .iter_oldest_first()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), total);
        assert!(records.windows(2).all(|w| w[0].stored_at <= w[1].stored_at));
        assert_eq!(records[0].key, "seg_0.ts");
    }

    #[test]
    fn test_scan_supports_early_termination() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..10 {
            store.put(&entry(&format!("seg_{i}.ts"), 1, i)).unwrap();
        }

        let first_three: Vec<_> = store
            .iter_oldest_first()
            .take(3)
            .map(|r| r.unwrap().key)
            .collect();
        assert_eq!(first_three, vec!["seg_0.ts", "seg_1.ts", "seg_2.ts"]);

        // A fresh scan starts from the beginning again.
        let first = store.iter_oldest_first().next().unwrap().unwrap();
        assert_eq!(first.key, "seg_0.ts");
    }

    #[test]
    fn test_delete_while_scanning() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..(SCAN_PAGE_SIZE + 3) {
            store.put(&entry(&format!("seg_{i}.ts"), 2, i as i64)).unwrap();
        }

        let mut removed = 0;
        for record in store.iter_oldest_first() {
            let record = record.unwrap();
            assert_eq!(store.delete(&record.key).unwrap(), Some(2));
            removed += 1;
        }

        assert_eq!(removed, SCAN_PAGE_SIZE + 3);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_scan_of_empty_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.iter_oldest_first().next().is_none());
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.db");
        let path = path.to_str().unwrap();

        SqliteStore::open(path)
            .unwrap()
            .put(&entry("seg_9.ts", 4, 0))
            .unwrap();

        let store = SqliteStore::open(path).unwrap();
        assert_eq!(store.get("seg_9.ts").unwrap().unwrap().len(), 4);
    }

    #[test]
    fn test_concurrent_puts_on_file_store_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..25 {
                        let key = format!("seg_{}_{}.ts", worker, i);
                        store.put(&entry(&key, 4000, 0)).unwrap();
                        // Re-storing a key goes through the replace path.
                        store.put(&entry(&key, 2000, 1)).unwrap();
                    }
                });
            }
        });

        assert_eq!(store.count().unwrap(), 200);
        assert_eq!(store.total_bytes().unwrap(), 200 * 2000);
    }
}
