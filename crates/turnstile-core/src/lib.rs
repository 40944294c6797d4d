//! # Turnstile Core
//!
//! Pure primitives for Turnstile: subscriber records, tariffs and access
//! windows.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the subscription data model.
//!
//! ## Key Types
//!
//! - [`SubscriberRecord`] - One access window per subscriber identity
//! - [`TariffTable`] - The validated, immutable set of [`Tier`]s
//! - [`AccessStatus`] - Result of an access check
//! - [`LifecycleState`] - Where a subscriber sits in the lifecycle
//!
//! ## Payload Contract
//!
//! Invoices carry `subscription_<tier_key>`. See [`payload`] module.

pub mod error;
pub mod payload;
pub mod record;
pub mod tariff;
pub mod time;
pub mod types;
pub mod validation;

pub use error::{ConfigurationError, CoreError, PayloadError};
pub use payload::{decode_payload, encode_payload, verify_checkout, PAYLOAD_PREFIX};
pub use record::{AccessStatus, LifecycleState, SubscriberRecord};
pub use tariff::{TariffTable, Tier, TierKey};
pub use time::{format_date, from_millis, to_millis, Timestamp};
pub use types::{ChannelId, Identity, InviteToken, PaymentId, SubscriberId};
pub use validation::{validate_tariffs, validate_tier_key};
