//! Message types exchanged with the messaging platform.
//!
//! Outbound: text messages with optional button menus, invoices and
//! pre-checkout answers. Inbound: button presses, payment events and
//! channel joins.

use serde::{Deserialize, Serialize};

use turnstile_core::{ChannelId, Identity, PaymentId, SubscriberId};

/// What a button does when pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonAction {
    /// Sends the callback data back as an inbound button press.
    Callback(String),
    /// Opens a URL.
    Url(String),
}

/// A menu button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

/// An inline menu: rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    pub rows: Vec<Vec<Button>>,
}

impl Menu {
    /// A menu with one button per row.
    pub fn single_column(buttons: impl IntoIterator<Item = Button>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    /// Callback data of every callback button, in display order.
    pub fn callbacks(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().filter_map(|b| match &b.action {
            ButtonAction::Callback(data) => Some(data.as_str()),
            ButtonAction::Url(_) => None,
        })
    }
}

/// A text message, optionally carrying a menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    pub menu: Option<Menu>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            menu: None,
        }
    }

    pub fn with_menu(mut self, menu: Menu) -> Self {
        self.menu = Some(menu);
        self
    }
}

/// One priced line of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledPrice {
    pub label: String,
    /// Amount in minor currency units.
    pub amount: u64,
}

/// A payment request sent to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    /// Opaque payload echoed back at pre-checkout and on confirmation.
    pub payload: String,
    pub currency: String,
    pub prices: Vec<LabeledPrice>,
    /// Credential of the payment provider.
    pub provider_token: String,
    pub need_email: bool,
}

impl Invoice {
    /// Total amount in minor units.
    pub fn total(&self) -> u64 {
        self.prices.iter().map(|p| p.amount).sum()
    }
}

/// Answer to a pre-checkout query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreCheckoutVerdict {
    Approve,
    Reject { error_message: String },
}

impl PreCheckoutVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, PreCheckoutVerdict::Approve)
    }
}

/// Events delivered by the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundEvent {
    /// The `/start` command.
    Start { from: SubscriberId },

    /// A callback button was pressed.
    ButtonPress { from: SubscriberId, data: String },

    /// The provider asks whether a checkout may proceed.
    PreCheckout {
        query_id: String,
        from: SubscriberId,
        payload: String,
        total_amount: u64,
    },

    /// Money has moved.
    SuccessfulPayment {
        from: SubscriberId,
        identity: Identity,
        payload: String,
        total_amount: u64,
        payment_id: PaymentId,
    },

    /// Members joined a chat.
    ChannelJoin {
        channel: ChannelId,
        members: Vec<SubscriberId>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_callbacks_skip_urls() {
        let menu = Menu::single_column([
            Button::callback("Buy", "choose_tariff"),
            Button::url("Support", "https://t.me/support"),
            Button::callback("Check", "check"),
        ]);

        let callbacks: Vec<&str> = menu.callbacks().collect();
        assert_eq!(callbacks, vec!["choose_tariff", "check"]);
    }

    #[test]
    fn test_invoice_total() {
        let invoice = Invoice {
            title: "t".into(),
            description: "d".into(),
            payload: "subscription_1_month".into(),
            currency: "RUB".into(),
            prices: vec![LabeledPrice {
                label: "1 month".into(),
                amount: 29_900,
            }],
            provider_token: "provider".into(),
            need_email: true,
        };
        assert_eq!(invoice.total(), 29_900);
    }
}
