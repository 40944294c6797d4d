//! Store trait: the abstract interface for subscription persistence.
//!
//! This trait allows the lifecycle engine to be storage-agnostic.
//! Implementations include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use chrono::Duration;
use turnstile_core::{PaymentId, SubscriberId, SubscriberRecord, TierKey, Timestamp};

use crate::error::Result;

/// Result of upserting a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    /// No record existed for this subscriber.
    Inserted,
    /// A prior record was replaced in full.
    Replaced,
}

/// Evidence of a payment that was captured but never provisioned.
///
/// Written whenever an activation fails after the payment was captured, so
/// the paid-but-not-provisioned state stays observable for manual follow-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningFailure {
    /// The subscriber who paid.
    pub subscriber_id: SubscriberId,
    /// The tier that was paid for.
    pub tier: TierKey,
    /// The payment, if the provider reported one.
    pub payment_id: Option<PaymentId>,
    /// Why provisioning failed.
    pub reason: String,
    /// When the failure was recorded.
    pub detected_at: Timestamp,
}

/// The SubscriptionStore trait: async interface for subscriber records.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Single-row atomicity**: `upsert` replaces the whole record for a
///   subscriber in one step; readers see either the old or the new version.
/// - **Concurrency**: every method is safe to call from many tasks at once.
///   The store owns concurrency control for a given key.
/// - **Range queries**: expiry queries are answered from an index on
///   `access_until`.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Atomically replace any existing record with the same subscriber id.
    async fn upsert(&self, record: &SubscriberRecord) -> Result<UpsertResult>;

    /// Get the record of a subscriber.
    async fn get(&self, subscriber_id: SubscriberId) -> Result<Option<SubscriberRecord>>;

    /// Delete the record of a subscriber.
    ///
    /// Returns whether a record was removed.
    async fn delete(&self, subscriber_id: SubscriberId) -> Result<bool>;

    /// Delete a record only if its window still ends at or before `as_of`.
    ///
    /// A repurchase that lands between an expiry query and this call moves
    /// `access_until` forward, so the fresh record survives.
    async fn delete_expired(&self, subscriber_id: SubscriberId, as_of: Timestamp) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Range Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Records with `access_until <= at`, ordered by `access_until`.
    async fn query_expired_as_of(&self, at: Timestamp) -> Result<Vec<SubscriberRecord>>;

    /// Records with `access_until` in `[at, at + window)`, ordered by
    /// `access_until`.
    async fn query_expiring_within(
        &self,
        at: Timestamp,
        window: Duration,
    ) -> Result<Vec<SubscriberRecord>>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Provisioning Failures
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a paid-but-not-provisioned activation.
    async fn record_provisioning_failure(&self, failure: &ProvisioningFailure) -> Result<()>;

    /// All unresolved provisioning failures, oldest first.
    async fn provisioning_failures(&self) -> Result<Vec<ProvisioningFailure>>;

    /// Mark every unresolved failure of a subscriber as resolved.
    ///
    /// Returns how many were resolved.
    async fn resolve_provisioning_failures(&self, subscriber_id: SubscriberId) -> Result<usize>;
}
