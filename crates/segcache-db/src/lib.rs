//! Segcache-DB: Persistent segment store backed by SQLite.
//!
//! This crate provides the durable key-to-blob table the segment cache sits
//! on, using rusqlite with r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `queries` - Raw segment table operations
//! - `store` - The [`SegmentStore`](store::SegmentStore) trait and its SQLite implementation
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use chrono::Utc;
//! use segcache_common::CacheEntry;
//! use segcache_db::store::{SegmentStore, SqliteStore};
//!
//! let store = SqliteStore::open("/var/cache/segcache/segments.db").unwrap();
//! let entry = CacheEntry::new("https://cdn/seq_1.ts", Bytes::from_static(b"ts"), Utc::now());
//! store.put(&entry).unwrap();
//! assert!(store.get("https://cdn/seq_1.ts").unwrap().is_some());
//! ```

pub mod migrations;
pub mod pool;
pub mod queries;
pub mod store;
