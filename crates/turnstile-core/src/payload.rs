//! Invoice payload contract.
//!
//! The opaque payload passed through the payment provider encodes exactly the
//! chosen tier: `subscription_<tier_key>`. On confirmation it is the only
//! source of truth for which tier to activate.

use crate::error::PayloadError;
use crate::tariff::{TariffTable, Tier};

/// Prefix of every subscription payload.
pub const PAYLOAD_PREFIX: &str = "subscription_";

/// Encode the payload for a tier.
pub fn encode_payload(tier: &Tier) -> String {
    format!("{}{}", PAYLOAD_PREFIX, tier.key)
}

/// Decode a payload into a tier of `table`.
pub fn decode_payload<'a>(table: &'a TariffTable, payload: &str) -> Result<&'a Tier, PayloadError> {
    let key = payload
        .strip_prefix(PAYLOAD_PREFIX)
        .ok_or_else(|| PayloadError::NotSubscription(payload.to_owned()))?;

    table
        .get_str(key)
        .ok_or_else(|| PayloadError::UnknownTier(key.to_owned()))
}

/// Pre-checkout verification: the payload names a known tier and the amount
/// about to be charged is that tier's price.
pub fn verify_checkout<'a>(
    table: &'a TariffTable,
    payload: &str,
    amount: u64,
) -> Result<&'a Tier, PayloadError> {
    let tier = decode_payload(table, payload)?;
    if tier.price != amount {
        return Err(PayloadError::AmountMismatch {
            tier: tier.key.to_string(),
            expected: tier.price,
            paid: amount,
        });
    }
    Ok(tier)
}
