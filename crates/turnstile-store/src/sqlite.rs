//! SQLite implementation of the SubscriptionStore trait.
//!
//! This is the primary storage backend for Turnstile. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use turnstile_core::{
    from_millis, to_millis, Identity, InviteToken, PaymentId, SubscriberId, SubscriberRecord,
    TierKey, Timestamp,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ProvisioningFailure, SubscriptionStore, UpsertResult};

const RECORD_COLUMNS: &str = "subscriber_id, display_name, handle, tier, purchased_at,
                              access_until, invite_token, payment_id";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// Helper to read a Unix-ms column as a timestamp
fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Timestamp> {
    let ms: i64 = row.get(idx)?;
    from_millis(ms).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

// Helper to convert a row to SubscriberRecord
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriberRecord> {
    let identity = Identity {
        display_name: row.get(1)?,
        handle: row.get(2)?,
    };

    Ok(SubscriberRecord::restore(
        SubscriberId::new(row.get(0)?),
        identity,
        TierKey::from_stored(row.get(3)?),
        timestamp_column(row, 4)?,
        timestamp_column(row, 5)?,
        row.get::<_, Option<String>>(6)?.map(InviteToken::new),
        row.get::<_, Option<String>>(7)?.map(PaymentId::new),
    ))
}

// Helper to convert a row to ProvisioningFailure
fn row_to_failure(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProvisioningFailure> {
    Ok(ProvisioningFailure {
        subscriber_id: SubscriberId::new(row.get(0)?),
        tier: TierKey::from_stored(row.get(1)?),
        payment_id: row.get::<_, Option<String>>(2)?.map(PaymentId::new),
        reason: row.get(3)?,
        detected_at: timestamp_column(row, 4)?,
    })
}

fn query_records(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<SubscriberRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let records = stmt
        .query_map(params, row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn upsert(&self, record: &SubscriberRecord) -> Result<UpsertResult> {
        let record = record.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let id = record.subscriber_id().get();

            let existed: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM subscribers WHERE subscriber_id = ?1)",
                params![id],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT OR REPLACE INTO subscribers (
                    subscriber_id, display_name, handle, tier, purchased_at,
                    access_until, invite_token, payment_id, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    record.identity().display_name,
                    record.identity().handle,
                    record.tier().as_str(),
                    to_millis(record.purchased_at()),
                    to_millis(record.access_until()),
                    record.invite_token().map(|t| t.as_str()),
                    record.payment_id().map(|p| p.as_str()),
                    chrono::Utc::now().timestamp_millis(),
                ],
            )?;

            tx.commit()?;

            Ok(if existed {
                UpsertResult::Replaced
            } else {
                UpsertResult::Inserted
            })
        })
        .await
    }

    async fn get(&self, subscriber_id: SubscriberId) -> Result<Option<SubscriberRecord>> {
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM subscribers WHERE subscriber_id = ?1"),
                params![subscriber_id.get()],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn delete(&self, subscriber_id: SubscriberId) -> Result<bool> {
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM subscribers WHERE subscriber_id = ?1",
                params![subscriber_id.get()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_expired(&self, subscriber_id: SubscriberId, as_of: Timestamp) -> Result<bool> {
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM subscribers WHERE subscriber_id = ?1 AND access_until <= ?2",
                params![subscriber_id.get(), to_millis(as_of)],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn query_expired_as_of(&self, at: Timestamp) -> Result<Vec<SubscriberRecord>> {
        self.run(move |conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM subscribers
                     WHERE access_until <= ?1
                     ORDER BY access_until, subscriber_id"
                ),
                params![to_millis(at)],
            )
        })
        .await
    }

    async fn query_expiring_within(
        &self,
        at: Timestamp,
        window: Duration,
    ) -> Result<Vec<SubscriberRecord>> {
        let start = to_millis(at);
        let end = to_millis(at + window);

        self.run(move |conn| {
            query_records(
                conn,
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM subscribers
                     WHERE access_until >= ?1 AND access_until < ?2
                     ORDER BY access_until, subscriber_id"
                ),
                params![start, end],
            )
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.run(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM subscribers", [], |row| row.get(0))?;
            usize::try_from(n).map_err(|_| StoreError::InvalidData(format!("negative count {n}")))
        })
        .await
    }

    async fn record_provisioning_failure(&self, failure: &ProvisioningFailure) -> Result<()> {
        let failure = failure.clone();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO provisioning_failures (
                    subscriber_id, tier, payment_id, reason, detected_at
                ) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    failure.subscriber_id.get(),
                    failure.tier.as_str(),
                    failure.payment_id.as_ref().map(|p| p.as_str()),
                    failure.reason,
                    to_millis(failure.detected_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn provisioning_failures(&self) -> Result<Vec<ProvisioningFailure>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT subscriber_id, tier, payment_id, reason, detected_at
                 FROM provisioning_failures
                 WHERE resolved_at IS NULL
                 ORDER BY id",
            )?;
            let failures = stmt
                .query_map([], row_to_failure)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(failures)
        })
        .await
    }

    async fn resolve_provisioning_failures(&self, subscriber_id: SubscriberId) -> Result<usize> {
        self.run(move |conn| {
            let resolved = conn.execute(
                "UPDATE provisioning_failures SET resolved_at = ?2
                 WHERE subscriber_id = ?1 AND resolved_at IS NULL",
                params![subscriber_id.get(), chrono::Utc::now().timestamp_millis()],
            )?;
            Ok(resolved)
        })
        .await
    }
}
