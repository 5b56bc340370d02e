//! Segment table queries.
//!
//! Stores and retrieves raw segment payloads keyed by URL. Reads map SQLite
//! failures to [`Error::ReadFailed`], writes to [`Error::WriteFailed`].

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use segcache_common::{from_epoch_millis, CacheEntry, Error, Result, SegmentRecord};

/// Position of a row in oldest-first order: `(stored_at, rowid)`.
///
/// Used as a keyset cursor so paging never re-reads or skips rows, even when
/// earlier rows are deleted between pages.
pub type ScanCursor = (i64, i64);

/// Get the payload stored under `url`.
pub fn get_payload(conn: &Connection, url: &str) -> Result<Option<Vec<u8>>> {
    conn.query_row(
        "SELECT payload FROM segments WHERE url = ?1",
        params![url],
        |row| row.get::<_, Vec<u8>>(0),
    )
    .optional()
    .map_err(|e| Error::read_failed(e.to_string()))
}

/// Insert or replace the entry for `entry.key`.
///
/// Returns the size of the payload that was replaced, if the key already
/// existed. The lookup and the write run in one IMMEDIATE transaction: the
/// write lock is taken up front, so concurrent writers wait on the busy
/// timeout instead of failing the read-to-write upgrade.
pub fn upsert(conn: &Connection, entry: &CacheEntry) -> Result<Option<u64>> {
    let write_err = |e: rusqlite::Error| Error::write_failed(e.to_string());

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate).map_err(write_err)?;

    let previous = tx
        .query_row(
            "SELECT size FROM segments WHERE url = ?1",
            params![entry.key],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(write_err)?;

    tx.execute(
        "INSERT OR REPLACE INTO segments (url, payload, size, stored_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            entry.key,
            entry.payload.as_ref(),
            entry.size() as i64,
            entry.stored_at.timestamp_millis(),
        ],
    )
    .map_err(write_err)?;

    tx.commit().map_err(write_err)?;

    Ok(previous.map(|size| size.max(0) as u64))
}

/// Delete the entry for `url`, returning the size of the removed payload.
pub fn delete(conn: &Connection, url: &str) -> Result<Option<u64>> {
    conn.query_row(
        "DELETE FROM segments WHERE url = ?1 RETURNING size",
        params![url],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map(|size| size.map(|s| s.max(0) as u64))
    .map_err(|e| Error::write_failed(e.to_string()))
}

/// Delete every entry, returning how many were removed.
pub fn clear(conn: &Connection) -> Result<u64> {
    conn.execute("DELETE FROM segments", [])
        .map(|n| n as u64)
        .map_err(|e| Error::write_failed(e.to_string()))
}

/// Fetch up to `limit` record headers in `(stored_at, rowid)` order,
/// starting strictly after `after`.
pub fn page_oldest_first(
    conn: &Connection,
    after: Option<ScanCursor>,
    limit: usize,
) -> Result<Vec<(ScanCursor, SegmentRecord)>> {
    let read_err = |e: rusqlite::Error| Error::read_failed(e.to_string());
    let (after_ts, after_rowid) = after.unwrap_or((i64::MIN, i64::MIN));

    let mut stmt = conn
        .prepare_cached(
            "SELECT rowid, url, size, stored_at FROM segments
             WHERE stored_at > ?1 OR (stored_at = ?1 AND rowid > ?2)
             ORDER BY stored_at ASC, rowid ASC
             LIMIT ?3",
        )
        .map_err(read_err)?;

    let rows = stmt
        .query_map(params![after_ts, after_rowid, limit as i64], |row| {
            let rowid: i64 = row.get(0)?;
            let stored_at: i64 = row.get(3)?;
            Ok((
                (stored_at, rowid),
                SegmentRecord {
                    key: row.get(1)?,
                    size: row.get::<_, i64>(2)?.max(0) as u64,
                    stored_at: from_epoch_millis(stored_at),
                },
            ))
        })
        .map_err(read_err)?;

    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(read_err)
}

/// Count stored entries.
pub fn count(conn: &Connection) -> Result<u64> {
    conn.query_row("SELECT COUNT(*) FROM segments", [], |row| row.get::<_, i64>(0))
        .map(|n| n.max(0) as u64)
        .map_err(|e| Error::read_failed(e.to_string()))
}

/// Sum of all stored payload sizes.
pub fn total_bytes(conn: &Connection) -> Result<u64> {
    conn.query_row("SELECT COALESCE(SUM(size), 0) FROM segments", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n.max(0) as u64)
    .map_err(|e| Error::read_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{init_memory_pool, PooledConnection};
    use bytes::Bytes;
    use chrono::{Duration, Utc};

    fn setup_test_db() -> PooledConnection {
        let pool = init_memory_pool().unwrap();
        pool.get().unwrap()
    }

    fn entry(url: &str, payload: &'static [u8], offset_ms: i64) -> CacheEntry {
        let base = from_epoch_millis(1_700_000_000_000);
        CacheEntry::new(
            url,
            Bytes::from_static(payload),
            base + Duration::milliseconds(offset_ms),
        )
    }

    #[test]
    fn test_upsert_and_get() {
        let conn = setup_test_db();
        let e = entry("https://cdn/seq_1.ts", &[0x47, 0x40, 0x00, 0x10], 0);

        assert_eq!(upsert(&conn, &e).unwrap(), None);

        let payload = get_payload(&conn, "https://cdn/seq_1.ts").unwrap().unwrap();
        assert_eq!(payload, vec![0x47, 0x40, 0x00, 0x10]);
    }

    #[test]
    fn test_get_nonexistent() {
        let conn = setup_test_db();
        assert!(get_payload(&conn, "https://cdn/missing.ts").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let conn = setup_test_db();
        upsert(&conn, &entry("k", b"first", 0)).unwrap();

        let previous = upsert(&conn, &entry("k", b"second!", 10)).unwrap();
        assert_eq!(previous, Some(5));

        assert_eq!(get_payload(&conn, "k").unwrap().unwrap(), b"second!".to_vec());
        assert_eq!(count(&conn).unwrap(), 1);
        assert_eq!(total_bytes(&conn).unwrap(), 7);
    }

    #[test]
    fn test_delete() {
        let conn = setup_test_db();
        upsert(&conn, &entry("k", b"abc", 0)).unwrap();

        assert_eq!(delete(&conn, "k").unwrap(), Some(3));
        assert!(get_payload(&conn, "k").unwrap().is_none());
    }

    #[test]
    fn test_delete_nonexistent() {
        let conn = setup_test_db();
        assert_eq!(delete(&conn, "nope").unwrap(), None);
    }

    #[test]
    fn test_clear() {
        let conn = setup_test_db();
        upsert(&conn, &entry("a", b"1", 0)).unwrap();
        upsert(&conn, &entry("b", b"22", 1)).unwrap();

        assert_eq!(clear(&conn).unwrap(), 2);
        assert_eq!(count(&conn).unwrap(), 0);
        assert_eq!(total_bytes(&conn).unwrap(), 0);
    }

    #[test]
    fn test_total_bytes_empty() {
        let conn = setup_test_db();
        assert_eq!(total_bytes(&conn).unwrap(), 0);
    }

    #[test]
    fn test_paging_is_oldest_first() {
        let conn = setup_test_db();
        // Inserted out of timestamp order on purpose.
        upsert(&conn, &entry("c", b"ccc", 30)).unwrap();
        upsert(&conn, &entry("a", b"a", 10)).unwrap();
        upsert(&conn, &entry("b", b"bb", 20)).unwrap();

        let first = page_oldest_first(&conn, None, 2).unwrap();
        let keys: Vec<_> = first.iter().map(|(_, r)| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(first[1].1.size, 2);

        let cursor = first.last().unwrap().0;
        let rest = page_oldest_first(&conn, Some(cursor), 2).unwrap();
        let keys: Vec<_> = rest.iter().map(|(_, r)| r.key.as_str()).collect();
        assert_eq!(keys, vec!["c"]);

        let cursor = rest.last().unwrap().0;
        assert!(page_oldest_first(&conn, Some(cursor), 2).unwrap().is_empty());
    }

    #[test]
    fn test_paging_breaks_timestamp_ties_by_insertion() {
        let conn = setup_test_db();
        let now = Utc::now();
        for key in ["x", "y", "z"] {
            upsert(&conn, &CacheEntry::new(key, Bytes::from_static(b"."), now)).unwrap();
        }

        let page = page_oldest_first(&conn, None, 10).unwrap();
        let keys: Vec<_> = page.iter().map(|(_, r)| r.key.as_str()).collect();
        assert_eq!(keys, vec!["x", "y", "z"]);
    }
}
