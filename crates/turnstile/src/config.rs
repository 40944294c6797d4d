//! Service configuration.
//!
//! Loaded once at process start from TOML, validated, then split into the
//! immutable pieces each component takes in its constructor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use turnstile_core::{ChannelId, ConfigurationError, SubscriberId, TariffTable};

/// Top-level configuration.
///
/// Every field except `channel_id` and `provider_token` has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// The restricted channel access is sold for.
    pub channel_id: i64,
    /// Identity of the bot itself; its own joins are ignored.
    pub bot_id: Option<i64>,
    /// Receives alerts about paid but unprovisioned activations.
    pub admin_id: Option<i64>,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// ISO 4217 currency of every invoice.
    pub currency: String,
    /// Payment provider credential passed along with invoices.
    pub provider_token: String,
    /// Target of the support button.
    pub support_url: String,
    /// Bound on every collaborator call, in seconds.
    pub call_timeout_secs: u64,
    /// How long a revoked member stays banned, in days.
    pub ban_horizon_days: u32,
    /// Period of the expiry scan, in seconds.
    pub expiry_interval_secs: u64,
    /// Delay before the first expiry scan, in seconds.
    pub first_run_delay_secs: u64,
    /// How far ahead the expiring-soon scan looks, in hours.
    pub warning_window_hours: u32,
    /// Time of day (UTC) the expiring-soon scan runs.
    pub warning_time: NaiveTime,
    /// Concurrent per-subscriber actions within one scan.
    pub worker_limit: usize,
    /// The tariff table.
    pub tariffs: TariffTable,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            channel_id: 0,
            bot_id: None,
            admin_id: None,
            database_path: PathBuf::from("subscribers.db"),
            currency: "RUB".to_string(),
            provider_token: String::new(),
            support_url: "https://t.me/support".to_string(),
            call_timeout_secs: 10,
            ban_horizon_days: 365,
            expiry_interval_secs: 6 * 60 * 60,
            first_run_delay_secs: 10,
            warning_window_hours: 24,
            warning_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
            worker_limit: 8,
            tariffs: TariffTable::standard(),
        }
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidSetting {
        name,
        reason: reason.into(),
    }
}

impl ServiceConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    /// Check every setting. Any failure is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.channel_id == 0 {
            return Err(invalid("channel_id", "must be set"));
        }
        if self.provider_token.trim().is_empty() {
            return Err(invalid("provider_token", "must be set"));
        }
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(invalid("currency", format!("{:?} is not an ISO 4217 code", self.currency)));
        }
        if self.call_timeout_secs == 0 {
            return Err(invalid("call_timeout_secs", "must be positive"));
        }
        if self.ban_horizon_days == 0 {
            return Err(invalid("ban_horizon_days", "must be positive"));
        }
        if self.expiry_interval_secs == 0 {
            return Err(invalid("expiry_interval_secs", "must be positive"));
        }
        if self.warning_window_hours == 0 {
            return Err(invalid("warning_window_hours", "must be positive"));
        }
        if self.worker_limit == 0 {
            return Err(invalid("worker_limit", "must be positive"));
        }

        // Deserialization already validated the table; a table built in code
        // goes through the same checks here.
        turnstile_core::validate_tariffs(&self.tariffs.iter().cloned().collect::<Vec<_>>())?;
        Ok(())
    }

    /// Settings of the lifecycle engine.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            channel: ChannelId(self.channel_id),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            ban_horizon: chrono::Duration::days(i64::from(self.ban_horizon_days)),
            warning_window: chrono::Duration::hours(i64::from(self.warning_window_hours)),
            worker_limit: self.worker_limit,
            support_url: self.support_url.clone(),
        }
    }

    /// Settings of the reconciliation scheduler.
    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            expiry_interval: Duration::from_secs(self.expiry_interval_secs),
            first_run_delay: Duration::from_secs(self.first_run_delay_secs),
            warning_time: self.warning_time,
        }
    }

    /// Settings of the inbound event dispatcher.
    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            channel: ChannelId(self.channel_id),
            bot: self.bot_id.map(SubscriberId::new),
            admin: self.admin_id.map(SubscriberId::new),
            currency: self.currency.clone(),
            provider_token: self.provider_token.clone(),
        }
    }
}

/// Configuration for the lifecycle engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The restricted channel.
    pub channel: ChannelId,
    /// Bound on every collaborator call.
    pub call_timeout: Duration,
    /// How long a revoked member stays banned.
    pub ban_horizon: chrono::Duration,
    /// Look-ahead of the expiring-soon scan.
    pub warning_window: chrono::Duration,
    /// Concurrent per-subscriber actions within one scan.
    pub worker_limit: usize,
    /// Target of the support button in menus.
    pub support_url: String,
}

impl EngineConfig {
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel: ChannelId(0),
            call_timeout: Duration::from_secs(10),
            ban_horizon: chrono::Duration::days(365),
            warning_window: chrono::Duration::days(1),
            worker_limit: 8,
            support_url: "https://t.me/support".to_string(),
        }
    }
}

/// Configuration for the reconciliation scheduler.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Period of the expiry scan.
    pub expiry_interval: Duration,
    /// Delay before the first expiry scan.
    pub first_run_delay: Duration,
    /// Time of day (UTC) of the expiring-soon scan.
    pub warning_time: NaiveTime,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            expiry_interval: Duration::from_secs(6 * 60 * 60),
            first_run_delay: Duration::from_secs(10),
            warning_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
        }
    }
}

/// Configuration for the inbound event dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub channel: ChannelId,
    pub bot: Option<SubscriberId>,
    pub admin: Option<SubscriberId>,
    pub currency: String,
    pub provider_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        channel_id = -1001234567890
        provider_token = "381764678:TEST:12345"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ServiceConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.currency, "RUB");
        assert_eq!(config.tariffs.len(), 4);
        assert_eq!(config.schedule().expiry_interval, Duration::from_secs(21_600));
        assert_eq!(config.engine().ban_horizon, chrono::Duration::days(365));
        assert_eq!(config.engine().warning_window, chrono::Duration::days(1));
        assert_eq!(
            config.schedule().warning_time,
            NaiveTime::from_hms_opt(12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_channel_is_fatal() {
        let err = ServiceConfig::from_toml(r#"provider_token = "x""#).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidSetting { name: "channel_id", .. }
        ));
    }

    #[test]
    fn test_custom_tariffs_and_schedule() {
        let config = ServiceConfig::from_toml(
            r#"
            channel_id = -100
            provider_token = "token"
            warning_time = "09:30:00"
            ban_horizon_days = 30

            [[tariffs]]
            key = "week"
            price = 9900
            duration_days = 7
            label = "1 week - 99₽"
            "#,
        )
        .unwrap();

        assert_eq!(config.tariffs.len(), 1);
        assert_eq!(config.engine().ban_horizon, chrono::Duration::days(30));
        assert_eq!(
            config.schedule().warning_time,
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_malformed_tariff_is_fatal() {
        let result = ServiceConfig::from_toml(
            r#"
            channel_id = -100
            provider_token = "token"

            [[tariffs]]
            key = "broken"
            price = 100
            duration_days = 0
            label = "broken"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_tariff_table_is_fatal() {
        let result = ServiceConfig::from_toml(
            r#"
            channel_id = -100
            provider_token = "token"
            tariffs = []
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_worker_limit_is_fatal() {
        let mut config = ServiceConfig::from_toml(MINIMAL).unwrap();
        config.worker_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turnstile.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.channel_id, -1001234567890);

        assert!(ServiceConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
