//! In-memory implementation of the SubscriptionStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Duration;

use turnstile_core::{SubscriberId, SubscriberRecord, Timestamp};

use crate::error::{Result, StoreError};
use crate::traits::{ProvisioningFailure, SubscriptionStore, UpsertResult};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Records indexed by subscriber.
    records: HashMap<SubscriberId, SubscriberRecord>,

    /// Unresolved provisioning failures, in insertion order.
    failures: Vec<ProvisioningFailure>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort by window end, then subscriber, to match the SQLite ordering.
fn sorted(mut records: Vec<SubscriberRecord>) -> Vec<SubscriberRecord> {
    records.sort_by_key(|r| (r.access_until(), r.subscriber_id()));
    records
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn upsert(&self, record: &SubscriberRecord) -> Result<UpsertResult> {
        let mut inner = self.write()?;
        match inner.records.insert(record.subscriber_id(), record.clone()) {
            Some(_) => Ok(UpsertResult::Replaced),
            None => Ok(UpsertResult::Inserted),
        }
    }

    async fn get(&self, subscriber_id: SubscriberId) -> Result<Option<SubscriberRecord>> {
        let inner = self.read()?;
        Ok(inner.records.get(&subscriber_id).cloned())
    }

    async fn delete(&self, subscriber_id: SubscriberId) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner.records.remove(&subscriber_id).is_some())
    }

    async fn delete_expired(&self, subscriber_id: SubscriberId, as_of: Timestamp) -> Result<bool> {
        let mut inner = self.write()?;

        let expired = inner
            .records
            .get(&subscriber_id)
            .is_some_and(|r| r.is_expired_at(as_of));

        if expired {
            inner.records.remove(&subscriber_id);
        }
        Ok(expired)
    }

    async fn query_expired_as_of(&self, at: Timestamp) -> Result<Vec<SubscriberRecord>> {
        let inner = self.read()?;
        Ok(sorted(
            inner
                .records
                .values()
                .filter(|r| r.is_expired_at(at))
                .cloned()
                .collect(),
        ))
    }

    async fn query_expiring_within(
        &self,
        at: Timestamp,
        window: Duration,
    ) -> Result<Vec<SubscriberRecord>> {
        let inner = self.read()?;
        Ok(sorted(
            inner
                .records
                .values()
                .filter(|r| r.expires_within(at, window))
                .cloned()
                .collect(),
        ))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.records.len())
    }

    async fn record_provisioning_failure(&self, failure: &ProvisioningFailure) -> Result<()> {
        let mut inner = self.write()?;
        inner.failures.push(failure.clone());
        Ok(())
    }

    async fn provisioning_failures(&self) -> Result<Vec<ProvisioningFailure>> {
        Ok(self.read()?.failures.clone())
    }

    async fn resolve_provisioning_failures(&self, subscriber_id: SubscriberId) -> Result<usize> {
        let mut inner = self.write()?;
        let before = inner.failures.len();
        inner.failures.retain(|f| f.subscriber_id != subscriber_id);
        Ok(before - inner.failures.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use turnstile_core::{Identity, TariffTable};

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    fn make_record(id: i64, tier: &str, purchased_at: Timestamp) -> SubscriberRecord {
        let table = TariffTable::standard();
        SubscriberRecord::new(
            SubscriberId::new(id),
            Identity::default(),
            table.get_str(tier).unwrap(),
            purchased_at,
        )
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let record = make_record(1, "1_month", t0());

        let result = store.upsert(&record).await.unwrap();
        assert_eq!(result, UpsertResult::Inserted);

        let retrieved = store.get(SubscriberId::new(1)).await.unwrap().unwrap();
        assert_eq!(retrieved, record);
    }

    #[tokio::test]
    async fn test_memory_store_replaces() {
        let store = MemoryStore::new();
        store.upsert(&make_record(1, "1_month", t0())).await.unwrap();

        let newer = make_record(1, "1_year", t0());
        let r2 = store.upsert(&newer).await.unwrap();
        assert_eq!(r2, UpsertResult::Replaced);

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(SubscriberId::new(1)).await.unwrap().unwrap(), newer);
    }

    #[tokio::test]
    async fn test_memory_store_delete_expired_guard() {
        let store = MemoryStore::new();
        let record = make_record(1, "1_month", t0());
        store.upsert(&record).await.unwrap();

        // Still active: guard refuses.
        assert!(!store.delete_expired(SubscriberId::new(1), t0()).await.unwrap());
        assert!(store
            .delete_expired(SubscriberId::new(1), record.access_until())
            .await
            .unwrap());
        assert!(store.get(SubscriberId::new(1)).await.unwrap().is_none());
    }
}
