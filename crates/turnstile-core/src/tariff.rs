//! Tariff table: the enumerated set of subscription tiers.
//!
//! The table is loaded once at startup, validated, and then treated as
//! immutable. Every tier maps to a fixed price and duration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigurationError;
use crate::validation::{validate_tariffs, validate_tier_key};

/// Key naming a tier, e.g. `3_months`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TierKey(String);

impl TierKey {
    /// Parse a tier key, rejecting anything outside `[a-z0-9_]+`.
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        validate_tier_key(raw)?;
        Ok(Self(raw.to_owned()))
    }

    /// Wrap a key read back from storage without re-validating it.
    ///
    /// A stored key may name a tier that has since left the tariff table;
    /// callers resolve it and treat misses as inconsistent records.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TierKey {
    type Error = ConfigurationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        validate_tier_key(&raw)?;
        Ok(Self(raw))
    }
}

impl From<TierKey> for String {
    fn from(key: TierKey) -> Self {
        key.0
    }
}

impl fmt::Debug for TierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TierKey({})", self.0)
    }
}

impl fmt::Display for TierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named subscription plan with fixed price and duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Identifier used in payloads, callbacks and storage.
    pub key: TierKey,
    /// Price in minor currency units (kopecks, cents).
    pub price: u64,
    /// Length of the access window in days.
    pub duration_days: u32,
    /// Human-readable label, e.g. `3 months - 799₽`.
    pub label: String,
}

impl Tier {
    pub fn new(key: &str, price: u64, duration_days: u32, label: &str) -> Result<Self, ConfigurationError> {
        Ok(Self {
            key: TierKey::parse(key)?,
            price,
            duration_days,
            label: label.to_owned(),
        })
    }

    /// Length of the access window.
    pub fn duration(&self) -> Duration {
        Duration::days(i64::from(self.duration_days))
    }

    /// The part of the label before ` - `, e.g. `3 months`.
    pub fn short_label(&self) -> &str {
        self.label
            .split_once(" - ")
            .map(|(head, _)| head)
            .unwrap_or(&self.label)
    }
}

/// The validated, immutable tariff table.
///
/// Tiers keep their configured order, which is also the order they are
/// offered in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tier>", into = "Vec<Tier>")]
pub struct TariffTable {
    tiers: Vec<Tier>,
}

impl TariffTable {
    /// Build a table, validating every entry.
    pub fn new(tiers: Vec<Tier>) -> Result<Self, ConfigurationError> {
        validate_tariffs(&tiers)?;
        Ok(Self { tiers })
    }

    /// Look up a tier by key.
    pub fn get(&self, key: &TierKey) -> Option<&Tier> {
        self.tiers.iter().find(|t| &t.key == key)
    }

    /// Look up a tier by its raw key string.
    pub fn get_str(&self, key: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.key.as_str() == key)
    }

    /// Resolve a raw key, failing with `UnknownTier`.
    pub fn resolve(&self, key: &str) -> Result<&Tier, ConfigurationError> {
        self.get_str(key)
            .ok_or_else(|| ConfigurationError::UnknownTier(key.to_owned()))
    }

    /// All tiers in configured order.
    pub fn iter(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// The four plans the service has always sold.
    pub fn standard() -> Self {
        let tiers = [
            ("1_month", 29_900, 30, "1 month - 299₽"),
            ("3_months", 79_900, 90, "3 months - 799₽"),
            ("6_months", 149_900, 180, "6 months - 1499₽"),
            ("1_year", 299_900, 365, "1 year - 2999₽"),
        ]
        .into_iter()
        .map(|(key, price, days, label)| Tier {
            key: TierKey(key.to_owned()),
            price,
            duration_days: days,
            label: label.to_owned(),
        })
        .collect();

        Self { tiers }
    }
}

impl Default for TariffTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<Vec<Tier>> for TariffTable {
    type Error = ConfigurationError;

    fn try_from(tiers: Vec<Tier>) -> Result<Self, Self::Error> {
        Self::new(tiers)
    }
}

impl From<TariffTable> for Vec<Tier> {
    fn from(table: TariffTable) -> Self {
        table.tiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        tariffs: TariffTable,
    }

    #[test]
    fn test_standard_table_is_valid() {
        let table = TariffTable::standard();
        assert_eq!(table.len(), 4);
        assert!(validate_tariffs(&table.tiers).is_ok());

        let three = table.get_str("3_months").unwrap();
        assert_eq!(three.price, 79_900);
        assert_eq!(three.duration(), Duration::days(90));
        assert_eq!(three.short_label(), "3 months");
    }

    #[test]
    fn test_resolve_unknown_tier() {
        let table = TariffTable::standard();
        assert_eq!(
            table.resolve("2_weeks").unwrap_err(),
            ConfigurationError::UnknownTier("2_weeks".into())
        );
    }

    #[test]
    fn test_table_from_toml_keeps_order() {
        let parsed: Wrapper = toml::from_str(
            r#"
            [[tariffs]]
            key = "week"
            price = 9900
            duration_days = 7
            label = "1 week - 99₽"

            [[tariffs]]
            key = "day"
            price = 1900
            duration_days = 1
            label = "1 day - 19₽"
            "#,
        )
        .unwrap();

        let keys: Vec<&str> = parsed.tariffs.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["week", "day"]);
    }

    #[test]
    fn test_malformed_toml_entry_rejected() {
        let result: Result<Wrapper, _> = toml::from_str(
            r#"
            [[tariffs]]
            key = "free"
            price = 0
            duration_days = 30
            label = "free"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(TierKey::parse("1 Month").is_err());
        assert!(TierKey::parse("").is_err());
        assert!(TierKey::parse("1_month").is_ok());
    }
}
