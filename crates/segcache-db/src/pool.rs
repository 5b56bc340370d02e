//! Database connection pool management.
//!
//! This module provides connection pooling for SQLite using r2d2.
//! It handles pool initialization, connection customization, and running migrations.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use segcache_common::{Error, Result};

use crate::migrations;

/// Type alias for the database connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const POOL_SIZE: u32 = 4;

/// In-memory databases use shared-cache table locks, which do not wait for
/// each other; a single connection serializes access instead.
const MEMORY_POOL_SIZE: u32 = 1;

/// How long a caller may wait for a pooled connection before giving up.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Initialize a new database pool with the given file path.
///
/// This function will:
/// - Create the SQLite database file if it doesn't exist
/// - Set up connection pooling with r2d2
/// - Enable WAL journal mode and a busy timeout on every connection
/// - Run pending database migrations
///
/// Failures are reported as [`Error::StoreUnavailable`]: a database that
/// cannot be opened disables caching rather than breaking playback.
///
/// # Example
///
/// ```no_run
/// use segcache_db::pool::init_pool;
///
/// let pool = init_pool("/var/cache/segcache/segments.db").unwrap();
/// let conn = pool.get().unwrap();
/// ```
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    // r2d2 retries failed connects until its timeout; try one direct open so an
    // unusable path fails immediately.
    rusqlite::Connection::open(db_path)
        .map_err(|e| Error::store_unavailable(format!("Failed to open {db_path}: {e}")))?;

    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
    });

    build_pool(manager, POOL_SIZE)
}

/// Initialize an in-memory database pool for testing.
///
/// Each call creates a uniquely-named shared-cache in-memory database so
/// that parallel tests do not interfere with each other, while all
/// connections *within* a single pool still share state.
///
/// # Example
///
/// ```
/// use segcache_db::pool::init_memory_pool;
///
/// let pool = init_memory_pool().unwrap();
/// let conn = pool.get().unwrap();
/// ```
pub fn init_memory_pool() -> Result<DbPool> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let uri = format!("file:segcache_mem_{n}?mode=memory&cache=shared");

    build_pool(SqliteConnectionManager::file(uri), MEMORY_POOL_SIZE)
}

fn build_pool(manager: SqliteConnectionManager, max_size: u32) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(CONNECTION_TIMEOUT)
        .build(manager)
        .map_err(|e| Error::store_unavailable(format!("Failed to create connection pool: {e}")))?;

    // Run migrations on a connection from the pool
    let conn = pool.get().map_err(|e| {
        Error::store_unavailable(format!("Failed to get connection for migrations: {e}"))
    })?;

    migrations::run_migrations(&conn)
        .map_err(|e| Error::store_unavailable(format!("Failed to run migrations: {e}")))?;

    Ok(pool)
}

/// Get a connection from the pool.
///
/// This is a convenience wrapper around `pool.get()` that converts the
/// r2d2 error into our common Error type.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {e}")))
}
