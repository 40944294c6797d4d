//! Actions produced by the lifecycle engine and the outcome of running them.
//!
//! Retry policy belongs to the action kind: a failed revocation is retried
//! on the next reconciliation tick because the record is kept, a failed
//! notification is logged and dropped.

use turnstile_core::{SubscriberId, SubscriberRecord, TierKey, Timestamp};

/// What a reconciliation action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Remove the subscriber from the channel.
    Revoke,
    /// Tell the subscriber their access ended.
    NotifyExpiry,
    /// Tell the subscriber their access ends soon.
    WarnExpiring,
}

/// What happens when an action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Keep the record; the next tick tries again.
    NextTick,
    /// Log and forget.
    Drop,
}

impl ActionKind {
    pub fn retry_policy(self) -> RetryPolicy {
        match self {
            ActionKind::Revoke => RetryPolicy::NextTick,
            ActionKind::NotifyExpiry | ActionKind::WarnExpiring => RetryPolicy::Drop,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Revoke => "revoke",
            ActionKind::NotifyExpiry => "notify_expiry",
            ActionKind::WarnExpiring => "warn_expiring",
        }
    }
}

/// Revoke and notify one expired subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryAction {
    pub subscriber_id: SubscriberId,
    pub tier: TierKey,
    /// End of the window that expired.
    pub access_until: Timestamp,
    /// End of the ban applied on revocation.
    pub ban_until: Timestamp,
}

/// Warn one subscriber whose window ends soon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarnAction {
    pub subscriber_id: SubscriberId,
    pub tier: TierKey,
    pub access_until: Timestamp,
}

/// A stored record whose tier is no longer in the tariff table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InconsistentRecord {
    pub subscriber_id: SubscriberId,
    pub tier: TierKey,
}

/// Expiry actions planned from one store query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryPlan {
    pub actions: Vec<ExpiryAction>,
    /// Skipped this scan, left in the store for manual inspection.
    pub inconsistent: Vec<InconsistentRecord>,
}

/// Warning actions planned from one store query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarnPlan {
    pub actions: Vec<WarnAction>,
    pub inconsistent: Vec<InconsistentRecord>,
}

/// How processing one expired subscriber ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// Revoked, notified and deleted.
    Completed,
    /// Revoked and deleted; the notification was dropped.
    CompletedWithoutNotice { error: String },
    /// Revocation failed; the record stays for the next tick.
    RevocationDeferred { error: String },
    /// The record was repurchased or removed since the query.
    Superseded,
    /// The store failed for this subscriber; the record stays.
    StoreFailed { error: String },
}

impl ExpiryOutcome {
    /// Whether the record left the store.
    pub fn is_deleted(&self) -> bool {
        matches!(
            self,
            ExpiryOutcome::Completed | ExpiryOutcome::CompletedWithoutNotice { .. }
        )
    }
}

/// Summary of one expiry scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    pub outcomes: Vec<(SubscriberId, ExpiryOutcome)>,
    pub inconsistent: Vec<InconsistentRecord>,
}

impl ExpiryReport {
    pub fn outcome_of(&self, subscriber_id: SubscriberId) -> Option<&ExpiryOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| *id == subscriber_id)
            .map(|(_, outcome)| outcome)
    }

    pub fn deleted(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_deleted()).count()
    }

    pub fn deferred(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| {
                matches!(
                    o,
                    ExpiryOutcome::RevocationDeferred { .. } | ExpiryOutcome::StoreFailed { .. }
                )
            })
            .count()
    }
}

/// Summary of one expiring-soon scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarnReport {
    pub delivered: Vec<SubscriberId>,
    pub dropped: Vec<(SubscriberId, String)>,
    pub inconsistent: Vec<InconsistentRecord>,
}

/// How an activation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// First window for this subscriber.
    Activated,
    /// A previous record was replaced; the window restarted.
    Renewed,
    /// The same payment was already applied; nothing new was issued.
    AlreadyActive,
}

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub record: SubscriberRecord,
    pub outcome: ActivationOutcome,
}

impl Activation {
    /// Days of access the activation granted.
    pub fn duration_days(&self) -> i64 {
        (self.record.access_until() - self.record.purchased_at()).num_days()
    }
}
