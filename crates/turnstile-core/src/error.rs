//! Error types for Turnstile Core.

use thiserror::Error;

/// Configuration errors: unknown tiers and malformed tariff tables.
///
/// Fatal at startup. A running service never recovers from these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("tariff table is empty")]
    EmptyTariffTable,

    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("duplicate tier: {0}")]
    DuplicateTier(String),

    #[error("invalid tier key {0:?}: expected [a-z0-9_]+")]
    InvalidTierKey(String),

    #[error("tier {tier}: price must be positive")]
    NonPositivePrice { tier: String },

    #[error("tier {tier}: duration must be at least one day")]
    NonPositiveDuration { tier: String },

    #[error("tier {tier}: display label is empty")]
    EmptyLabel { tier: String },

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors decoding the opaque payload passed through the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload {0:?} is not a subscription payload")]
    NotSubscription(String),

    #[error("payload names unknown tier {0:?}")]
    UnknownTier(String),

    #[error("amount {paid} does not match tier {tier} price {expected}")]
    AmountMismatch {
        tier: String,
        expected: u64,
        paid: u64,
    },
}

/// Core errors that can occur in pure computations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),
}

impl From<toml::de::Error> for ConfigurationError {
    fn from(e: toml::de::Error) -> Self {
        ConfigurationError::Parse(e.to_string())
    }
}
