//! Store doubles with injected faults.

use async_trait::async_trait;
use chrono::Duration;

use turnstile_core::{SubscriberId, SubscriberRecord, Timestamp};
use turnstile_store::{
    MemoryStore, ProvisioningFailure, Result, StoreError, SubscriptionStore, UpsertResult,
};

/// A [`MemoryStore`] that refuses every record write.
///
/// Reads, deletes and provisioning failures behave normally, which models a
/// store that lost its write path for subscriber rows only.
pub struct UnwritableStore {
    inner: MemoryStore,
}

impl UnwritableStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
        }
    }
}

impl Default for UnwritableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionStore for UnwritableStore {
    async fn upsert(&self, _record: &SubscriberRecord) -> Result<UpsertResult> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }

    async fn get(&self, subscriber_id: SubscriberId) -> Result<Option<SubscriberRecord>> {
        self.inner.get(subscriber_id).await
    }

    async fn delete(&self, subscriber_id: SubscriberId) -> Result<bool> {
        self.inner.delete(subscriber_id).await
    }

    async fn delete_expired(&self, subscriber_id: SubscriberId, as_of: Timestamp) -> Result<bool> {
        self.inner.delete_expired(subscriber_id, as_of).await
    }

    async fn query_expired_as_of(&self, at: Timestamp) -> Result<Vec<SubscriberRecord>> {
        self.inner.query_expired_as_of(at).await
    }

    async fn query_expiring_within(
        &self,
        at: Timestamp,
        window: Duration,
    ) -> Result<Vec<SubscriberRecord>> {
        self.inner.query_expiring_within(at, window).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }

    async fn record_provisioning_failure(&self, failure: &ProvisioningFailure) -> Result<()> {
        self.inner.record_provisioning_failure(failure).await
    }

    async fn provisioning_failures(&self) -> Result<Vec<ProvisioningFailure>> {
        self.inner.provisioning_failures().await
    }

    async fn resolve_provisioning_failures(&self, subscriber_id: SubscriberId) -> Result<usize> {
        self.inner.resolve_provisioning_failures(subscriber_id).await
    }
}
