//! User-facing texts and menus.

use turnstile_channel::{Button, Menu, OutboundMessage};
use turnstile_core::{format_date, InviteToken, TariffTable, Tier, Timestamp};

/// Callback data of the main menu's buy button.
pub const CHOOSE_TARIFF: &str = "choose_tariff";
/// Callback data of the access check button.
pub const CHECK: &str = "check";
/// Callback data of the refresh button.
pub const REFRESH: &str = "refresh";
/// Callback data of the tariff menu's back button.
pub const BACK: &str = "back";
/// Prefix of a tariff button's callback data.
pub const TARIFF_PREFIX: &str = "tariff_";

/// Renders every screen the service shows.
#[derive(Debug, Clone)]
pub struct Screens {
    support_url: String,
}

impl Screens {
    pub fn new(support_url: impl Into<String>) -> Self {
        Self {
            support_url: support_url.into(),
        }
    }

    pub fn main_menu(&self) -> Menu {
        Menu::single_column([
            Button::callback("💰 Buy subscription", CHOOSE_TARIFF),
            Button::callback("🔐 Check access", CHECK),
            Button::url("🆘 Support", self.support_url.clone()),
            Button::callback("🔄 Refresh menu", REFRESH),
        ])
    }

    /// One button per tier in table order, then back.
    pub fn tariff_menu(&self, tariffs: &TariffTable) -> Menu {
        Menu::single_column(
            tariffs
                .iter()
                .map(|tier| {
                    Button::callback(tier.label.clone(), format!("{}{}", TARIFF_PREFIX, tier.key))
                })
                .chain(std::iter::once(Button::callback("🔙 Back", BACK))),
        )
    }

    pub fn welcome(&self) -> OutboundMessage {
        OutboundMessage::text("Welcome! Choose an action:").with_menu(self.main_menu())
    }

    pub fn choose_tariff(&self, tariffs: &TariffTable) -> OutboundMessage {
        OutboundMessage::text("Choose a subscription plan:").with_menu(self.tariff_menu(tariffs))
    }

    /// Reply to an access check of an active subscriber. `tier` is `None`
    /// when the stored tier left the tariff table.
    pub fn access_active(&self, access_until: Timestamp, tier: Option<&Tier>) -> OutboundMessage {
        let label = tier.map(|t| t.label.as_str()).unwrap_or("unknown tariff");
        OutboundMessage::text(format!(
            "✅ Access active until {}\nPlan: {}\n\n\
             ⚠️ If you leave the channel before your subscription ends, \
             you will have to buy access again.",
            format_date(access_until),
            label
        ))
        .with_menu(self.main_menu())
    }

    pub fn access_inactive(&self) -> OutboundMessage {
        OutboundMessage::text("❌ You have no active subscription.").with_menu(self.main_menu())
    }

    /// Delivered once per activation, carrying the single-use invitation.
    pub fn invite(&self, invite: &InviteToken, duration_days: i64) -> OutboundMessage {
        OutboundMessage::text(format!(
            "🎉 Payment received! Your link to join the channel:\n{}\n\n\
             ⚠️ Note:\n\
             1. The link works once\n\
             2. Access lasts {} days\n\
             3. Do not share the link\n\
             4. Leaving the channel ends your access",
            invite.as_str(),
            duration_days
        ))
    }

    /// Shown when a paid activation could not be provisioned.
    pub fn activation_failed(&self) -> OutboundMessage {
        OutboundMessage::text(
            "❌ Something went wrong while granting access. \
             Your payment is safe; please contact support.",
        )
        .with_menu(self.main_menu())
    }

    pub fn already_active(&self, access_until: Timestamp) -> OutboundMessage {
        OutboundMessage::text(format!(
            "✅ This payment is already applied. Access active until {}.",
            format_date(access_until)
        ))
        .with_menu(self.main_menu())
    }

    pub fn joined(&self) -> OutboundMessage {
        OutboundMessage::text("✅ You have joined the channel!")
    }

    pub fn expired(&self, access_until: Timestamp) -> OutboundMessage {
        OutboundMessage::text(format!(
            "❌ Your subscription ended on {}. Channel access is closed.\n\
             Buy a new subscription to regain access.",
            format_date(access_until)
        ))
        .with_menu(self.main_menu())
    }

    pub fn expiring(&self, access_until: Timestamp) -> OutboundMessage {
        OutboundMessage::text(format!(
            "⚠️ Your subscription ends on {}!\nRenew it to keep your channel access.",
            format_date(access_until)
        ))
        .with_menu(self.main_menu())
    }

    /// Alert for the administrator: paid, not provisioned.
    pub fn provisioning_alert(&self, subscriber: impl std::fmt::Display, reason: &str) -> OutboundMessage {
        OutboundMessage::text(format!(
            "⚠️ Payment captured but access not granted for subscriber {}: {}",
            subscriber, reason
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_tariff_menu_follows_table_order() {
        let screens = Screens::new("https://t.me/support");
        let menu = screens.tariff_menu(&TariffTable::standard());
        let callbacks: Vec<&str> = menu.callbacks().collect();

        assert_eq!(
            callbacks,
            vec![
                "tariff_1_month",
                "tariff_3_months",
                "tariff_6_months",
                "tariff_1_year",
                "back"
            ]
        );
    }

    #[test]
    fn test_main_menu_callbacks() {
        let screens = Screens::new("https://t.me/support");
        let menu = screens.main_menu();
        let callbacks: Vec<&str> = menu.callbacks().collect();
        assert_eq!(callbacks, vec![CHOOSE_TARIFF, CHECK, REFRESH]);
    }

    #[test]
    fn test_dates_render_as_iso_days() {
        let screens = Screens::new("https://t.me/support");
        let until = Utc.with_ymd_and_hms(2026, 7, 30, 8, 15, 0).unwrap();

        assert!(screens.expired(until).text.contains("2026-07-30"));
        assert!(screens.expiring(until).text.contains("2026-07-30"));
        assert!(screens.access_active(until, None).text.contains("unknown tariff"));
    }
}
