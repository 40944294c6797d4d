//! Tariff validation: structural checks run once at startup.

use std::collections::HashSet;

use crate::error::ConfigurationError;
use crate::tariff::Tier;

/// Validate a tier key.
///
/// Keys travel inside payment payloads and callback data, so they are
/// restricted to lowercase ASCII letters, digits and underscores.
pub fn validate_tier_key(raw: &str) -> Result<(), ConfigurationError> {
    let ok = !raw.is_empty()
        && raw
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidTierKey(raw.to_owned()))
    }
}

/// Validate a tariff table for completeness.
///
/// This performs:
/// - Non-empty check
/// - Key syntax and uniqueness
/// - Positive price and duration
/// - Non-empty display label
pub fn validate_tariffs(tiers: &[Tier]) -> Result<(), ConfigurationError> {
    // 1. At least one tier
    if tiers.is_empty() {
        return Err(ConfigurationError::EmptyTariffTable);
    }

    let mut seen = HashSet::new();
    for tier in tiers {
        let key = tier.key.as_str();

        // 2. Key syntax (TierKey already enforces this when parsed)
        validate_tier_key(key)?;

        // 3. Unique keys
        if !seen.insert(key) {
            return Err(ConfigurationError::DuplicateTier(key.to_owned()));
        }

        // 4. Positive price
        if tier.price == 0 {
            return Err(ConfigurationError::NonPositivePrice {
                tier: key.to_owned(),
            });
        }

        // 5. Positive duration
        if tier.duration_days == 0 {
            return Err(ConfigurationError::NonPositiveDuration {
                tier: key.to_owned(),
            });
        }

        // 6. Label
        if tier.label.trim().is_empty() {
            return Err(ConfigurationError::EmptyLabel {
                tier: key.to_owned(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(key: &str, price: u64, days: u32, label: &str) -> Tier {
        Tier::new(key, price, days, label).unwrap()
    }

    #[test]
    fn test_valid_table() {
        let tiers = vec![tier("1_month", 29_900, 30, "1 month"), tier("1_year", 299_900, 365, "1 year")];
        assert!(validate_tariffs(&tiers).is_ok());
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(
            validate_tariffs(&[]).unwrap_err(),
            ConfigurationError::EmptyTariffTable
        );
    }

    #[test]
    fn test_zero_price() {
        let tiers = vec![tier("gift", 0, 30, "gift")];
        assert!(matches!(
            validate_tariffs(&tiers),
            Err(ConfigurationError::NonPositivePrice { .. })
        ));
    }

    #[test]
    fn test_zero_duration() {
        let tiers = vec![tier("none", 100, 0, "none")];
        assert!(matches!(
            validate_tariffs(&tiers),
            Err(ConfigurationError::NonPositiveDuration { .. })
        ));
    }

    #[test]
    fn test_blank_label() {
        let tiers = vec![tier("blank", 100, 1, "   ")];
        assert!(matches!(
            validate_tariffs(&tiers),
            Err(ConfigurationError::EmptyLabel { .. })
        ));
    }

    #[test]
    fn test_duplicate_key() {
        let tiers = vec![tier("1_month", 100, 30, "a"), tier("1_month", 200, 30, "b")];
        assert_eq!(
            validate_tariffs(&tiers).unwrap_err(),
            ConfigurationError::DuplicateTier("1_month".into())
        );
    }

    #[test]
    fn test_tier_key_charset() {
        assert!(validate_tier_key("6_months").is_ok());
        assert!(validate_tier_key("six-months").is_err());
        assert!(validate_tier_key("Month").is_err());
    }
}
