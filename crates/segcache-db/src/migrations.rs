//! Database migrations module
//!
//! Migrations are embedded in the binary and executed in order. A
//! `schema_migrations` table tracks which versions have been applied, which
//! makes opening an existing database idempotent.

use rusqlite::Connection;
use segcache_common::{Error, Result};

/// A single migration with its SQL content
struct Migration {
    version: usize,
    name: &'static str,
    sql: &'static str,
}

/// V1: segment table keyed by URL, ordered for oldest-first scans.
const V1_SEGMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS segments (
    url       TEXT PRIMARY KEY NOT NULL,
    payload   BLOB NOT NULL,
    size      INTEGER NOT NULL,
    stored_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_segments_stored_at ON segments(stored_at);
"#;

/// All available migrations
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "segments",
    sql: V1_SEGMENTS,
}];

/// Initialize the migrations table if it doesn't exist
fn init_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
fn get_current_version(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
        row.get::<_, Option<usize>>(0)
    })
    .map(|v| v.unwrap_or(0))
}

/// Apply a single migration
fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let failed =
        |e: rusqlite::Error| Error::database(format!("Migration {} failed: {e}", migration.version));

    conn.execute_batch(migration.sql).map_err(failed)?;

    conn.execute(
        "INSERT INTO schema_migrations (version, name) VALUES (?, ?)",
        rusqlite::params![migration.version, migration.name],
    )
    .map_err(failed)?;

    Ok(())
}

/// Run all pending migrations
///
/// Each pending migration is applied in its own transaction.
///
/// # Returns
///
/// * `Ok(usize)` - Number of migrations applied
/// * `Err(Error)` - If any migration fails
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    init_migrations_table(conn).map_err(|e| Error::database(e.to_string()))?;

    let current_version = get_current_version(conn).map_err(|e| Error::database(e.to_string()))?;

    let pending: Vec<_> = MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
        .collect();

    let mut applied_count = 0;
    for migration in pending {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        apply_migration(&tx, migration)?;

        tx.commit()
            .map_err(|e| Error::database(format!("Migration {} failed: {e}", migration.version)))?;

        applied_count += 1;

        tracing::debug!(
            "Applied migration {}: {}",
            migration.version,
            migration.name
        );
    }

    Ok(applied_count)
}
