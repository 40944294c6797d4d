//! Error types for Turnstile.

use turnstile_channel::ChannelError;
use turnstile_core::{ConfigurationError, PayloadError, SubscriberId, TierKey};
use turnstile_store::StoreError;
use thiserror::Error;

/// Errors that can occur during lifecycle operations.
///
/// Propagation policy: configuration errors abort startup, invitation
/// issuance errors abort the one activation they belong to, and nothing
/// raised for a single subscriber ever aborts a reconciliation batch.
#[derive(Debug, Error)]
pub enum TurnstileError {
    /// Unknown tier or malformed configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A payment payload that does not name a known tier.
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),

    /// The single-use invitation could not be issued; the payment stays
    /// captured and the subscriber is not provisioned.
    #[error("invitation issuance failed for {subscriber_id}: {source}")]
    InvitationIssuance {
        subscriber_id: SubscriberId,
        #[source]
        source: ChannelError,
    },

    /// The invitation was issued but the new record could not be written;
    /// the payment stays captured and the subscriber is not provisioned.
    #[error("record of {subscriber_id} not stored after payment: {source}")]
    ActivationNotStored {
        subscriber_id: SubscriberId,
        #[source]
        source: StoreError,
    },

    /// A stored record references a tier that left the tariff table.
    #[error("record of {subscriber_id} references unknown tier {tier}")]
    InconsistentRecord {
        subscriber_id: SubscriberId,
        tier: TierKey,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl TurnstileError {
    /// Whether the failure was already kept as a provisioning failure by
    /// the engine.
    pub fn is_recorded_provisioning_failure(&self) -> bool {
        matches!(
            self,
            Self::InvitationIssuance { .. } | Self::ActivationNotStored { .. }
        )
    }
}

/// Result type for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
