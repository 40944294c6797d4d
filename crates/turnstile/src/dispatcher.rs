//! Inbound event handling: menus, the invoice flow, payment confirmation
//! and channel joins.
//!
//! Replies are best-effort. A reply that cannot be delivered is logged and
//! never turns a handled event into an error.

use std::sync::Arc;

use turnstile_channel::{
    bounded, ChannelControl, InboundEvent, Invoice, LabeledPrice, Messenger, OutboundMessage,
    PreCheckoutVerdict,
};
use turnstile_core::{
    decode_payload, encode_payload, verify_checkout, AccessStatus, ChannelId, Identity,
    PaymentId, SubscriberId, Tier, TierKey,
};
use turnstile_store::SubscriptionStore;

use crate::actions::ActivationOutcome;
use crate::config::DispatcherConfig;
use crate::engine::{ActivationRequest, LifecycleEngine};
use crate::error::{Result, TurnstileError};
use crate::texts::{BACK, CHECK, CHOOSE_TARIFF, REFRESH, TARIFF_PREFIX};

/// Routes inbound platform events to the lifecycle engine.
pub struct Dispatcher<S, C, M> {
    engine: Arc<LifecycleEngine<S, C, M>>,
    config: DispatcherConfig,
}

impl<S, C, M> Dispatcher<S, C, M>
where
    S: SubscriptionStore,
    C: ChannelControl,
    M: Messenger,
{
    pub fn new(engine: Arc<LifecycleEngine<S, C, M>>, config: DispatcherConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &LifecycleEngine<S, C, M> {
        &self.engine
    }

    /// Handle one inbound event.
    pub async fn handle(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Start { from } => {
                self.reply(from, self.engine.screens().welcome()).await;
                Ok(())
            }
            InboundEvent::ButtonPress { from, data } => self.on_button(from, &data).await,
            InboundEvent::PreCheckout {
                query_id,
                from,
                payload,
                total_amount,
            } => {
                self.on_pre_checkout(&query_id, from, &payload, total_amount)
                    .await;
                Ok(())
            }
            InboundEvent::SuccessfulPayment {
                from,
                identity,
                payload,
                total_amount,
                payment_id,
            } => {
                self.on_payment(from, identity, &payload, total_amount, payment_id)
                    .await
            }
            InboundEvent::ChannelJoin { channel, members } => {
                self.on_join(channel, &members).await
            }
        }
    }

    async fn on_button(&self, from: SubscriberId, data: &str) -> Result<()> {
        let screens = self.engine.screens();
        match data {
            CHOOSE_TARIFF => {
                self.reply(from, screens.choose_tariff(self.engine.tariffs()))
                    .await
            }
            BACK | REFRESH => self.reply(from, screens.welcome()).await,
            CHECK => {
                let now = self.engine.now();
                let reply = match self.engine.check_access(from, now).await? {
                    AccessStatus::Active { tier, access_until } => {
                        screens.access_active(access_until, self.engine.tier_of(&tier))
                    }
                    AccessStatus::Inactive => screens.access_inactive(),
                };
                self.reply(from, reply).await;
            }
            other => match other
                .strip_prefix(TARIFF_PREFIX)
                .and_then(|key| self.engine.tariffs().get_str(key))
            {
                Some(tier) => self.send_invoice(from, tier).await,
                None => tracing::debug!(subscriber_id = %from, data = other, "unknown button ignored"),
            },
        }
        Ok(())
    }

    /// The payment request for `tier`.
    pub fn invoice(&self, tier: &Tier) -> Invoice {
        Invoice {
            title: format!("Subscription: {}", tier.short_label()),
            description: format!("Channel access: {}", tier.label),
            payload: encode_payload(tier),
            currency: self.config.currency.clone(),
            prices: vec![LabeledPrice {
                label: tier.label.clone(),
                amount: tier.price,
            }],
            provider_token: self.config.provider_token.clone(),
            need_email: true,
        }
    }

    async fn send_invoice(&self, to: SubscriberId, tier: &Tier) {
        let invoice = self.invoice(tier);
        let sent = bounded(
            "send_invoice",
            self.engine.config().call_timeout,
            self.engine.messenger().send_invoice(to, &invoice),
        )
        .await;
        match sent {
            Ok(()) => tracing::debug!(subscriber_id = %to, tier = %tier.key, "invoice sent"),
            Err(error) => tracing::warn!(subscriber_id = %to, %error, "invoice not delivered"),
        }
    }

    /// Approve only a known tier charged at exactly its price.
    async fn on_pre_checkout(&self, query_id: &str, from: SubscriberId, payload: &str, amount: u64) {
        let verdict = match verify_checkout(self.engine.tariffs(), payload, amount) {
            Ok(_) => PreCheckoutVerdict::Approve,
            Err(error) => {
                tracing::warn!(subscriber_id = %from, payload, amount, %error, "checkout rejected");
                PreCheckoutVerdict::Reject {
                    error_message: "This plan is not available. Please choose again.".to_string(),
                }
            }
        };

        let answered = bounded(
            "answer_pre_checkout",
            self.engine.config().call_timeout,
            self.engine.messenger().answer_pre_checkout(query_id, &verdict),
        )
        .await;
        if let Err(error) = answered {
            tracing::warn!(subscriber_id = %from, query_id, %error, "pre-checkout answer not delivered");
        }
    }

    async fn on_payment(
        &self,
        from: SubscriberId,
        identity: Identity,
        payload: &str,
        amount: u64,
        payment_id: PaymentId,
    ) -> Result<()> {
        let screens = self.engine.screens();

        let tier = match decode_payload(self.engine.tariffs(), payload) {
            Ok(tier) => tier,
            Err(e) => {
                tracing::error!(
                    subscriber_id = %from,
                    payment_id = payment_id.as_str(),
                    error = %e,
                    "payment with unusable payload"
                );
                self.engine
                    .record_unprovisioned(
                        from,
                        TierKey::from_stored(payload.to_owned()),
                        Some(payment_id),
                        e.to_string(),
                    )
                    .await;
                self.reply(from, screens.activation_failed()).await;
                self.alert_admin(from, &e.to_string()).await;
                return Err(e.into());
            }
        };
        if tier.price != amount {
            tracing::warn!(
                subscriber_id = %from,
                tier = %tier.key,
                expected = tier.price,
                paid = amount,
                "confirmed amount differs from tier price"
            );
        }

        let request = ActivationRequest::new(from, tier.key.as_str())
            .identity(identity)
            .payment(payment_id.clone());

        match self.engine.activate(request).await {
            Ok(activation) => {
                let reply = match (activation.outcome, activation.record.invite_token()) {
                    (ActivationOutcome::AlreadyActive, _) | (_, None) => {
                        screens.already_active(activation.record.access_until())
                    }
                    (_, Some(invite)) => screens.invite(invite, activation.duration_days()),
                };
                self.reply(from, reply).await;
                Ok(())
            }
            Err(e) => {
                // Every failure past this point leaves a captured payment
                // without access.
                if !e.is_recorded_provisioning_failure() {
                    self.engine
                        .record_unprovisioned(
                            from,
                            tier.key.clone(),
                            Some(payment_id),
                            e.to_string(),
                        )
                        .await;
                }
                self.reply(from, screens.activation_failed()).await;
                let reason = match &e {
                    TurnstileError::InvitationIssuance { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                self.alert_admin(from, &reason).await;
                Err(e)
            }
        }
    }

    async fn on_join(&self, channel: ChannelId, members: &[SubscriberId]) -> Result<()> {
        if channel != self.config.channel {
            return Ok(());
        }

        let now = self.engine.now();
        for &member in members {
            if Some(member) == self.config.bot {
                continue;
            }
            if self.engine.check_access(member, now).await?.is_active() {
                self.reply(member, self.engine.screens().joined()).await;
            }
        }
        Ok(())
    }

    async fn alert_admin(&self, subscriber: SubscriberId, reason: &str) {
        if let Some(admin) = self.config.admin {
            let alert = self.engine.screens().provisioning_alert(subscriber, reason);
            self.reply(admin, alert).await;
        }
    }

    async fn reply(&self, to: SubscriberId, message: OutboundMessage) {
        if let Err(error) = self.engine.deliver(to, &message).await {
            tracing::warn!(subscriber_id = %to, %error, "reply not delivered");
        }
    }
}
