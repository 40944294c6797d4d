//! Subscriber record: one access window per subscriber identity.
//!
//! `access_until` is always derived from `purchased_at` and the tier's
//! duration. A repurchase builds a fresh record; remaining time is never
//! carried over.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::tariff::{Tier, TierKey};
use crate::time::Timestamp;
use crate::types::{Identity, InviteToken, PaymentId, SubscriberId};

/// The stored access window of one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    subscriber_id: SubscriberId,
    identity: Identity,
    tier: TierKey,
    purchased_at: Timestamp,
    access_until: Timestamp,
    invite_token: Option<InviteToken>,
    payment_id: Option<PaymentId>,
}

impl SubscriberRecord {
    /// Start a new access window for `tier` at `purchased_at`.
    pub fn new(
        subscriber_id: SubscriberId,
        identity: Identity,
        tier: &Tier,
        purchased_at: Timestamp,
    ) -> Self {
        Self {
            subscriber_id,
            identity,
            tier: tier.key.clone(),
            purchased_at,
            access_until: purchased_at + tier.duration(),
            invite_token: None,
            payment_id: None,
        }
    }

    /// Rebuild a record exactly as a storage backend persisted it.
    ///
    /// Storage only ever returns what was written through [`SubscriberRecord::new`],
    /// so the derived `access_until` is taken as-is.
    pub fn restore(
        subscriber_id: SubscriberId,
        identity: Identity,
        tier: TierKey,
        purchased_at: Timestamp,
        access_until: Timestamp,
        invite_token: Option<InviteToken>,
        payment_id: Option<PaymentId>,
    ) -> Self {
        Self {
            subscriber_id,
            identity,
            tier,
            purchased_at,
            access_until,
            invite_token,
            payment_id,
        }
    }

    /// Attach the single-use invitation issued for this activation.
    pub fn with_invite(mut self, invite: InviteToken) -> Self {
        self.invite_token = Some(invite);
        self
    }

    /// Attach the payment that triggered this activation.
    pub fn with_payment(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn tier(&self) -> &TierKey {
        &self.tier
    }

    pub fn purchased_at(&self) -> Timestamp {
        self.purchased_at
    }

    pub fn access_until(&self) -> Timestamp {
        self.access_until
    }

    pub fn invite_token(&self) -> Option<&InviteToken> {
        self.invite_token.as_ref()
    }

    pub fn payment_id(&self) -> Option<&PaymentId> {
        self.payment_id.as_ref()
    }

    /// Active iff `access_until > at` (strict).
    pub fn is_active_at(&self, at: Timestamp) -> bool {
        self.access_until > at
    }

    /// Expired iff `access_until <= at`.
    pub fn is_expired_at(&self, at: Timestamp) -> bool {
        self.access_until <= at
    }

    /// Whether the window ends within `[at, at + window)`.
    pub fn expires_within(&self, at: Timestamp, window: Duration) -> bool {
        self.access_until >= at && self.access_until < at + window
    }

    /// Lifecycle position of this record at `at`.
    pub fn state_at(&self, at: Timestamp) -> LifecycleState {
        if self.is_active_at(at) {
            LifecycleState::Active
        } else {
            LifecycleState::ExpiredPendingRevocation
        }
    }
}

/// Where a subscriber identity sits in its lifecycle.
///
/// `Revoked` is never observed directly: a revoked record is deleted and the
/// identity falls back to `NoSubscription`. "Expiring soon" is a query
/// result, not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    NoSubscription,
    Active,
    ExpiredPendingRevocation,
}

impl LifecycleState {
    pub fn of(record: Option<&SubscriberRecord>, at: Timestamp) -> Self {
        record
            .map(|r| r.state_at(at))
            .unwrap_or(LifecycleState::NoSubscription)
    }
}

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessStatus {
    Active {
        tier: TierKey,
        access_until: Timestamp,
    },
    Inactive,
}

impl AccessStatus {
    /// Access status derived from an optional record at `at`.
    pub fn of(record: Option<&SubscriberRecord>, at: Timestamp) -> Self {
        match record {
            Some(r) if r.is_active_at(at) => AccessStatus::Active {
                tier: r.tier.clone(),
                access_until: r.access_until,
            },
            _ => AccessStatus::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AccessStatus::Active { .. })
    }
}
