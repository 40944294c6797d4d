//! Proptest generators for property-based testing.

use chrono::Duration;
use proptest::prelude::*;

use turnstile_core::{SubscriberId, TariffTable, Tier};

/// Generate a valid tier key.
pub fn tier_key() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,16}".prop_map(String::from)
}

/// Generate a valid tier.
pub fn tier() -> impl Strategy<Value = Tier> {
    (tier_key(), 1u64..=10_000_000, 1u32..=730).prop_map(|(key, price, days)| {
        let label = format!("{} days - {}", days, price / 100);
        Tier::new(&key, price, days, &label).unwrap()
    })
}

/// Generate a valid tariff table of one to six tiers.
pub fn tariff_table() -> impl Strategy<Value = TariffTable> {
    prop::collection::btree_map(tier_key(), (1u64..=10_000_000, 1u32..=730), 1..=6).prop_map(
        |entries| {
            let tiers = entries
                .into_iter()
                .map(|(key, (price, days))| {
                    Tier::new(&key, price, days, &format!("{} - {} days", key, days)).unwrap()
                })
                .collect();
            TariffTable::new(tiers).unwrap()
        },
    )
}

/// Generate a subscriber identifier.
pub fn subscriber_id() -> impl Strategy<Value = SubscriberId> {
    (1i64..=i64::MAX / 2).prop_map(SubscriberId::new)
}

/// Generate a time offset of at most `max_days`, at second resolution.
pub fn offset(max_days: i64) -> impl Strategy<Value = Duration> {
    (0i64..=max_days * 86_400).prop_map(Duration::seconds)
}
