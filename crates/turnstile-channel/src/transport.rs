//! Collaborator abstractions: channel membership control and messaging.
//!
//! Implementations wrap a real messaging platform. Every call may be slow
//! or fail; callers bound each one with [`bounded`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use turnstile_core::{ChannelId, InviteToken, SubscriberId, Timestamp};

use crate::error::{ChannelError, Result};
use crate::messages::{Invoice, OutboundMessage, PreCheckoutVerdict};

/// Control over who may be a member of the restricted channel.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ChannelControl: Send + Sync {
    /// Create an invitation admitting exactly one member, then invalid.
    async fn create_single_use_invite(&self, channel: ChannelId, label: &str) -> Result<InviteToken>;

    /// Remove a member and keep them out until `until`.
    ///
    /// Implemented as a time-bounded ban so a stale invitation cannot be
    /// used to silently rejoin.
    async fn revoke_membership(
        &self,
        channel: ChannelId,
        member: SubscriberId,
        until: Timestamp,
    ) -> Result<()>;
}

/// Outbound side of the messaging platform.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message, optionally with a menu.
    async fn send_message(&self, to: SubscriberId, message: &OutboundMessage) -> Result<()>;

    /// Send a payment request.
    async fn send_invoice(&self, to: SubscriberId, invoice: &Invoice) -> Result<()>;

    /// Answer a pre-checkout query.
    async fn answer_pre_checkout(&self, query_id: &str, verdict: &PreCheckoutVerdict) -> Result<()>;
}

/// Run a collaborator call with a time bound.
///
/// Expiry of the bound is reported as [`ChannelError::Timeout`], a
/// transient failure.
pub async fn bounded<T, F>(op: &'static str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(op, ?limit, "collaborator call timed out");
            Err(ChannelError::Timeout { op, after: limit })
        }
    }
}

/// In-memory collaborators for testing.
///
/// Record every call and allow failures and latency to be injected.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// An invitation issued by [`MemoryChannel`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct IssuedInvite {
        pub channel: ChannelId,
        pub label: String,
        pub token: InviteToken,
    }

    /// A revocation applied by [`MemoryChannel`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Revocation {
        pub channel: ChannelId,
        pub member: SubscriberId,
        pub until: Timestamp,
    }

    #[derive(Default)]
    struct ChannelState {
        invites: Vec<IssuedInvite>,
        revocations: Vec<Revocation>,
        invite_faults: VecDeque<ChannelError>,
        revoke_faults: HashMap<SubscriberId, ChannelError>,
        latency: Option<Duration>,
        revoke_attempts: usize,
    }

    /// In-memory channel membership control.
    #[derive(Clone, Default)]
    pub struct MemoryChannel {
        state: Arc<Mutex<ChannelState>>,
    }

    impl MemoryChannel {
        /// Create a new memory channel.
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next invite creation with `error`.
        pub async fn fail_next_invite(&self, error: ChannelError) {
            self.state.lock().await.invite_faults.push_back(error);
        }

        /// Fail every revocation of `member` until cleared.
        pub async fn fail_revocations_of(&self, member: SubscriberId, error: ChannelError) {
            self.state.lock().await.revoke_faults.insert(member, error);
        }

        /// Remove all injected failures.
        pub async fn clear_faults(&self) {
            let mut state = self.state.lock().await;
            state.invite_faults.clear();
            state.revoke_faults.clear();
        }

        /// Delay every call by `latency`.
        pub async fn set_latency(&self, latency: Duration) {
            self.state.lock().await.latency = Some(latency);
        }

        /// All invitations issued so far.
        pub async fn invites(&self) -> Vec<IssuedInvite> {
            self.state.lock().await.invites.clone()
        }

        /// All successful revocations so far.
        pub async fn revocations(&self) -> Vec<Revocation> {
            self.state.lock().await.revocations.clone()
        }

        /// Revocation calls made, including failed ones.
        pub async fn revoke_attempts(&self) -> usize {
            self.state.lock().await.revoke_attempts
        }

        async fn delay(&self) {
            let latency = self.state.lock().await.latency;
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
        }
    }

    #[async_trait]
    impl ChannelControl for MemoryChannel {
        async fn create_single_use_invite(
            &self,
            channel: ChannelId,
            label: &str,
        ) -> Result<InviteToken> {
            self.delay().await;

            let mut state = self.state.lock().await;
            if let Some(error) = state.invite_faults.pop_front() {
                return Err(error);
            }

            let token = InviteToken::new(format!(
                "https://t.me/+{}",
                hex::encode(rand::random::<[u8; 12]>())
            ));
            state.invites.push(IssuedInvite {
                channel,
                label: label.to_owned(),
                token: token.clone(),
            });
            Ok(token)
        }

        async fn revoke_membership(
            &self,
            channel: ChannelId,
            member: SubscriberId,
            until: Timestamp,
        ) -> Result<()> {
            self.delay().await;

            let mut state = self.state.lock().await;
            state.revoke_attempts += 1;
            if let Some(error) = state.revoke_faults.get(&member) {
                return Err(error.clone());
            }

            state.revocations.push(Revocation {
                channel,
                member,
                until,
            });
            Ok(())
        }
    }

    #[derive(Default)]
    struct MessengerState {
        messages: Vec<(SubscriberId, OutboundMessage)>,
        invoices: Vec<(SubscriberId, Invoice)>,
        answers: Vec<(String, PreCheckoutVerdict)>,
        unreachable: HashMap<SubscriberId, ChannelError>,
        latency: Option<Duration>,
    }

    /// In-memory messenger recording everything it is asked to deliver.
    #[derive(Clone, Default)]
    pub struct MemoryMessenger {
        state: Arc<Mutex<MessengerState>>,
    }

    impl MemoryMessenger {
        /// Create a new memory messenger.
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every message and invoice addressed to `member`.
        pub async fn make_unreachable(&self, member: SubscriberId, error: ChannelError) {
            self.state.lock().await.unreachable.insert(member, error);
        }

        /// Delay every call by `latency`.
        pub async fn set_latency(&self, latency: Duration) {
            self.state.lock().await.latency = Some(latency);
        }

        /// Delivered messages, in order.
        pub async fn messages(&self) -> Vec<(SubscriberId, OutboundMessage)> {
            self.state.lock().await.messages.clone()
        }

        /// Delivered messages addressed to `member`.
        pub async fn messages_to(&self, member: SubscriberId) -> Vec<OutboundMessage> {
            self.state
                .lock()
                .await
                .messages
                .iter()
                .filter(|(to, _)| *to == member)
                .map(|(_, m)| m.clone())
                .collect()
        }

        /// Delivered invoices, in order.
        pub async fn invoices(&self) -> Vec<(SubscriberId, Invoice)> {
            self.state.lock().await.invoices.clone()
        }

        /// Pre-checkout answers, in order.
        pub async fn answers(&self) -> Vec<(String, PreCheckoutVerdict)> {
            self.state.lock().await.answers.clone()
        }

        async fn delay(&self) {
            let latency = self.state.lock().await.latency;
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
        }
    }

    #[async_trait]
    impl Messenger for MemoryMessenger {
        async fn send_message(&self, to: SubscriberId, message: &OutboundMessage) -> Result<()> {
            self.delay().await;

            let mut state = self.state.lock().await;
            if let Some(error) = state.unreachable.get(&to) {
                return Err(error.clone());
            }
            state.messages.push((to, message.clone()));
            Ok(())
        }

        async fn send_invoice(&self, to: SubscriberId, invoice: &Invoice) -> Result<()> {
            self.delay().await;

            let mut state = self.state.lock().await;
            if let Some(error) = state.unreachable.get(&to) {
                return Err(error.clone());
            }
            state.invoices.push((to, invoice.clone()));
            Ok(())
        }

        async fn answer_pre_checkout(
            &self,
            query_id: &str,
            verdict: &PreCheckoutVerdict,
        ) -> Result<()> {
            self.delay().await;

            let mut state = self.state.lock().await;
            state.answers.push((query_id.to_owned(), verdict.clone()));
            Ok(())
        }
    }
}
