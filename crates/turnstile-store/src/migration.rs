//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, chrono::Utc::now().timestamp_millis()],
            )?;
            tracing::info!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: subscriber records.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per subscriber; a repurchase replaces the row
        CREATE TABLE subscribers (
            subscriber_id INTEGER PRIMARY KEY,  -- platform user id
            display_name TEXT,
            handle TEXT,
            tier TEXT NOT NULL,                 -- tier key, resolved against the tariff table
            purchased_at INTEGER NOT NULL,      -- Unix ms
            access_until INTEGER NOT NULL,      -- Unix ms, purchased_at + tier duration
            invite_token TEXT,                  -- single-use invitation issued on activation
            payment_id TEXT,                    -- provider charge id of the activating payment
            updated_at INTEGER NOT NULL         -- local time of last write
        );

        CREATE INDEX idx_subscribers_access_until ON subscribers(access_until);
        "#,
    )?;

    Ok(())
}

/// Migration v2: paid-but-not-provisioned evidence.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE provisioning_failures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subscriber_id INTEGER NOT NULL,
            tier TEXT NOT NULL,
            payment_id TEXT,
            reason TEXT NOT NULL,
            detected_at INTEGER NOT NULL,       -- Unix ms
            resolved_at INTEGER                 -- NULL while unresolved
        );

        CREATE INDEX idx_provisioning_failures_open
            ON provisioning_failures(subscriber_id) WHERE resolved_at IS NULL;
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"subscribers".to_string()));
        assert!(tables.contains(&"provisioning_failures".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_creates_expiry_index() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let index: String = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='index' AND tbl_name='subscribers'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(index, "idx_subscribers_access_until");
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_unreadable_version_is_an_error() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_migrations (version TEXT, applied_at INTEGER);
             INSERT INTO schema_migrations VALUES ('v1', 0);",
        )
        .unwrap();

        assert!(matches!(migrate(&mut conn), Err(StoreError::Database(_))));

        let subscribers: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'subscribers'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(subscribers, 0);
    }
}
