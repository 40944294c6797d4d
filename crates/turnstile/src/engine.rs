//! The lifecycle engine: activation, access checks and the two scans.
//!
//! The engine owns no state beyond its collaborators and the per-subscriber
//! locks. The store is the single source of truth for access windows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use tracing::Instrument;

use turnstile_channel::{bounded, ChannelControl, Messenger, OutboundMessage};
use turnstile_core::{
    AccessStatus, Identity, PaymentId, SubscriberId, SubscriberRecord, TariffTable, Tier,
    TierKey, Timestamp,
};
use turnstile_store::{ProvisioningFailure, SubscriptionStore, UpsertResult};

use crate::actions::{
    ActionKind, Activation, ActivationOutcome, ExpiryAction, ExpiryOutcome, ExpiryPlan,
    ExpiryReport, InconsistentRecord, WarnAction, WarnPlan, WarnReport,
};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{Result, TurnstileError};
use crate::texts::Screens;

/// A request to start a new access window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRequest {
    pub subscriber_id: SubscriberId,
    pub identity: Identity,
    /// Raw tier key; unknown keys are a configuration error.
    pub tier: String,
    /// Provider identifier of the confirmed payment.
    pub payment_id: Option<PaymentId>,
}

impl ActivationRequest {
    pub fn new(subscriber_id: SubscriberId, tier: impl Into<String>) -> Self {
        Self {
            subscriber_id,
            identity: Identity::default(),
            tier: tier.into(),
            payment_id: None,
        }
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn payment(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }
}

type SubscriberLocks = HashMap<SubscriberId, Arc<tokio::sync::Mutex<()>>>;

/// The subscription lifecycle engine.
///
/// Provides:
/// - Activation with single-use invitation issuance
/// - Access checks
/// - Expiry reconciliation (revoke, notify, delete)
/// - Expiring-soon warnings
pub struct LifecycleEngine<S, C, M> {
    store: Arc<S>,
    channel: Arc<C>,
    messenger: Arc<M>,
    tariffs: Arc<TariffTable>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    screens: Screens,
    /// Serializes activation and expiry processing per subscriber.
    locks: Mutex<SubscriberLocks>,
}

impl<S, C, M> LifecycleEngine<S, C, M>
where
    S: SubscriptionStore,
    C: ChannelControl,
    M: Messenger,
{
    /// Create a new engine. The tariff table is fixed for its lifetime.
    pub fn new(
        store: Arc<S>,
        channel: Arc<C>,
        messenger: Arc<M>,
        tariffs: TariffTable,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let screens = Screens::new(config.support_url.clone());
        Self {
            store,
            channel,
            messenger,
            tariffs: Arc::new(tariffs),
            clock,
            config,
            screens,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn messenger(&self) -> &M {
        &self.messenger
    }

    pub fn tariffs(&self) -> &TariffTable {
        &self.tariffs
    }

    pub fn screens(&self) -> &Screens {
        &self.screens
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Look up the tier a record references.
    pub fn tier_of(&self, key: &TierKey) -> Option<&Tier> {
        self.tariffs.get(key)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Activation
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a fresh access window for a confirmed payment.
    ///
    /// The window always restarts at the current time. A single-use
    /// invitation is issued first; if that fails nothing is written, the
    /// failure is recorded for manual follow-up and
    /// [`TurnstileError::InvitationIssuance`] is returned. A record that
    /// cannot be written after the invitation went out is recorded the same
    /// way and returned as [`TurnstileError::ActivationNotStored`]. A repeated call
    /// for a payment that is already applied returns the existing record.
    pub async fn activate(&self, request: ActivationRequest) -> Result<Activation> {
        let tier = self.tariffs.resolve(&request.tier)?.clone();

        let lock = self.subscriber_lock(request.subscriber_id);
        let result = {
            let _guard = lock.lock().await;
            self.activate_locked(request, &tier).await
        };
        drop(lock);
        self.release_unused_locks();
        result
    }

    async fn activate_locked(&self, request: ActivationRequest, tier: &Tier) -> Result<Activation> {
        let subscriber_id = request.subscriber_id;
        let now = self.clock.now();

        if let Some(payment_id) = &request.payment_id {
            if let Some(existing) = self.store.get(subscriber_id).await? {
                if existing.payment_id() == Some(payment_id) && existing.is_active_at(now) {
                    tracing::info!(
                        %subscriber_id,
                        payment_id = payment_id.as_str(),
                        "payment already applied"
                    );
                    return Ok(Activation {
                        record: existing,
                        outcome: ActivationOutcome::AlreadyActive,
                    });
                }
            }
        }

        let label = format!("sub_{}", subscriber_id);
        let invite = match bounded(
            "create_single_use_invite",
            self.config.call_timeout,
            self.channel
                .create_single_use_invite(self.config.channel, &label),
        )
        .await
        {
            Ok(invite) => invite,
            Err(source) => {
                tracing::error!(
                    %subscriber_id,
                    tier = %tier.key,
                    payment_id = request.payment_id.as_ref().map(|p| p.as_str()),
                    error = %source,
                    "invitation issuance failed; payment captured but not provisioned"
                );
                self.record_unprovisioned(
                    subscriber_id,
                    tier.key.clone(),
                    request.payment_id.clone(),
                    source.to_string(),
                )
                .await;
                return Err(TurnstileError::InvitationIssuance {
                    subscriber_id,
                    source,
                });
            }
        };

        let mut record =
            SubscriberRecord::new(subscriber_id, request.identity, tier, now).with_invite(invite);
        if let Some(payment_id) = request.payment_id {
            record = record.with_payment(payment_id);
        }

        let outcome = match self.store.upsert(&record).await {
            Ok(UpsertResult::Inserted) => ActivationOutcome::Activated,
            Ok(UpsertResult::Replaced) => ActivationOutcome::Renewed,
            Err(source) => {
                tracing::error!(
                    %subscriber_id,
                    tier = %tier.key,
                    payment_id = record.payment_id().map(|p| p.as_str()),
                    error = %source,
                    "record not stored; invitation issued but access not granted"
                );
                self.record_unprovisioned(
                    subscriber_id,
                    tier.key.clone(),
                    record.payment_id().cloned(),
                    format!("record not stored: {}", source),
                )
                .await;
                return Err(TurnstileError::ActivationNotStored {
                    subscriber_id,
                    source,
                });
            }
        };

        match self.store.resolve_provisioning_failures(subscriber_id).await {
            Ok(0) => {}
            Ok(resolved) => {
                tracing::info!(%subscriber_id, resolved, "provisioning failures resolved")
            }
            Err(e) => tracing::warn!(%subscriber_id, error = %e, "could not resolve provisioning failures"),
        }

        tracing::info!(
            %subscriber_id,
            tier = %tier.key,
            access_until = %record.access_until(),
            ?outcome,
            "subscription activated"
        );

        Ok(Activation { record, outcome })
    }

    /// Keep a paid but unprovisioned activation for manual follow-up.
    ///
    /// Best-effort: if the store cannot take the entry either, the failure
    /// is only logged.
    pub async fn record_unprovisioned(
        &self,
        subscriber_id: SubscriberId,
        tier: TierKey,
        payment_id: Option<PaymentId>,
        reason: String,
    ) {
        let failure = ProvisioningFailure {
            subscriber_id,
            tier,
            payment_id,
            reason,
            detected_at: self.clock.now(),
        };
        if let Err(e) = self.store.record_provisioning_failure(&failure).await {
            tracing::error!(%subscriber_id, error = %e, "could not record provisioning failure");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether `subscriber_id` has access at `at`. Never mutates.
    pub async fn check_access(&self, subscriber_id: SubscriberId, at: Timestamp) -> Result<AccessStatus> {
        let record = self.store.get(subscriber_id).await?;
        Ok(AccessStatus::of(record.as_ref(), at))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expiry
    // ─────────────────────────────────────────────────────────────────────────

    /// The expiry actions due at `at`, without running them.
    pub async fn plan_expired(&self, at: Timestamp) -> Result<ExpiryPlan> {
        let mut plan = ExpiryPlan::default();
        for record in self.store.query_expired_as_of(at).await? {
            if let Some(inconsistent) = self.check_tier(&record) {
                plan.inconsistent.push(inconsistent);
                continue;
            }
            plan.actions.push(ExpiryAction {
                subscriber_id: record.subscriber_id(),
                tier: record.tier().clone(),
                access_until: record.access_until(),
                ban_until: at + self.config.ban_horizon,
            });
        }
        Ok(plan)
    }

    /// Revoke, notify and delete every subscriber expired at `at`.
    ///
    /// Subscribers are processed concurrently up to the worker limit. A
    /// failure for one never affects the others; only a failing store query
    /// aborts the scan.
    pub async fn scan_expired(&self, at: Timestamp) -> Result<ExpiryReport> {
        let span = tracing::info_span!("reconcile.expired", %at);
        async move {
            let plan = self.plan_expired(at).await?;
            let planned = plan.actions.len();

            let mut outcomes: Vec<_> = stream::iter(plan.actions)
                .map(|action| async move {
                    let subscriber_id = action.subscriber_id;
                    (subscriber_id, self.execute_expiry(action, at).await)
                })
                .buffer_unordered(self.config.worker_limit.max(1))
                .collect()
                .await;
            outcomes.sort_by_key(|(id, _)| *id);

            let report = ExpiryReport {
                outcomes,
                inconsistent: plan.inconsistent,
            };
            tracing::info!(
                planned,
                deleted = report.deleted(),
                deferred = report.deferred(),
                inconsistent = report.inconsistent.len(),
                "expiry scan finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn execute_expiry(&self, action: ExpiryAction, at: Timestamp) -> ExpiryOutcome {
        let subscriber_id = action.subscriber_id;

        let lock = self.subscriber_lock(subscriber_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.revoke_and_delete(&action, at).await
        };
        drop(lock);
        self.release_unused_locks();

        if outcome != ExpiryOutcome::Completed {
            return outcome;
        }

        let notice = self.screens.expired(action.access_until);
        match self.deliver(subscriber_id, &notice).await {
            Ok(()) => ExpiryOutcome::Completed,
            Err(error) => {
                tracing::warn!(
                    %subscriber_id,
                    action = ActionKind::NotifyExpiry.as_str(),
                    retry = ?ActionKind::NotifyExpiry.retry_policy(),
                    %error,
                    "expiry notice dropped"
                );
                ExpiryOutcome::CompletedWithoutNotice {
                    error: error.to_string(),
                }
            }
        }
    }

    /// Runs under the subscriber's lock, so an activation cannot slip in
    /// between the re-read and the delete.
    async fn revoke_and_delete(&self, action: &ExpiryAction, at: Timestamp) -> ExpiryOutcome {
        let subscriber_id = action.subscriber_id;

        match self.store.get(subscriber_id).await {
            Ok(Some(current)) if current.is_expired_at(at) => {}
            Ok(_) => {
                tracing::debug!(%subscriber_id, "record repurchased or removed since query");
                return ExpiryOutcome::Superseded;
            }
            Err(e) => {
                tracing::warn!(%subscriber_id, error = %e, "store read failed; record kept");
                return ExpiryOutcome::StoreFailed { error: e.to_string() };
            }
        }

        let revoked = bounded(
            "revoke_membership",
            self.config.call_timeout,
            self.channel
                .revoke_membership(self.config.channel, subscriber_id, action.ban_until),
        )
        .await;
        if let Err(error) = revoked {
            tracing::warn!(
                %subscriber_id,
                action = ActionKind::Revoke.as_str(),
                retry = ?ActionKind::Revoke.retry_policy(),
                transient = error.is_transient(),
                %error,
                "revocation failed; record kept"
            );
            return ExpiryOutcome::RevocationDeferred {
                error: error.to_string(),
            };
        }

        match self.store.delete_expired(subscriber_id, at).await {
            Ok(true) => {
                tracing::info!(
                    %subscriber_id,
                    tier = %action.tier,
                    access_until = %action.access_until,
                    "membership revoked and record deleted"
                );
                ExpiryOutcome::Completed
            }
            Ok(false) => ExpiryOutcome::Superseded,
            Err(e) => {
                tracing::warn!(%subscriber_id, error = %e, "delete failed after revocation; record kept");
                ExpiryOutcome::StoreFailed { error: e.to_string() }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expiring soon
    // ─────────────────────────────────────────────────────────────────────────

    /// The warnings due for windows ending in `[at, at + window)`.
    pub async fn plan_expiring(&self, at: Timestamp, window: chrono::Duration) -> Result<WarnPlan> {
        let mut plan = WarnPlan::default();
        for record in self.store.query_expiring_within(at, window).await? {
            if let Some(inconsistent) = self.check_tier(&record) {
                plan.inconsistent.push(inconsistent);
                continue;
            }
            plan.actions.push(WarnAction {
                subscriber_id: record.subscriber_id(),
                tier: record.tier().clone(),
                access_until: record.access_until(),
            });
        }
        Ok(plan)
    }

    /// Warn every subscriber whose window ends within `window` of `at`.
    ///
    /// Read-only and best-effort. Nothing remembers who was warned, so a
    /// subscriber seen by two scans is warned twice.
    pub async fn scan_expiring(&self, at: Timestamp, window: chrono::Duration) -> Result<WarnReport> {
        let span = tracing::info_span!("reconcile.expiring", %at, window_hours = window.num_hours());
        async move {
            let plan = self.plan_expiring(at, window).await?;

            let results: Vec<_> = stream::iter(plan.actions)
                .map(|action| async move {
                    let notice = self.screens.expiring(action.access_until);
                    (action.subscriber_id, self.deliver(action.subscriber_id, &notice).await)
                })
                .buffer_unordered(self.config.worker_limit.max(1))
                .collect()
                .await;

            let mut report = WarnReport {
                inconsistent: plan.inconsistent,
                ..WarnReport::default()
            };
            for (subscriber_id, result) in results {
                match result {
                    Ok(()) => report.delivered.push(subscriber_id),
                    Err(error) => {
                        tracing::warn!(
                            %subscriber_id,
                            action = ActionKind::WarnExpiring.as_str(),
                            %error,
                            "expiry warning dropped"
                        );
                        report.dropped.push((subscriber_id, error.to_string()));
                    }
                }
            }
            report.delivered.sort();
            report.dropped.sort();

            tracing::info!(
                delivered = report.delivered.len(),
                dropped = report.dropped.len(),
                inconsistent = report.inconsistent.len(),
                "expiring scan finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Send a message within the call timeout.
    pub async fn deliver(
        &self,
        to: SubscriberId,
        message: &OutboundMessage,
    ) -> std::result::Result<(), turnstile_channel::ChannelError> {
        bounded(
            "send_message",
            self.config.call_timeout,
            self.messenger.send_message(to, message),
        )
        .await
    }

    fn check_tier(&self, record: &SubscriberRecord) -> Option<InconsistentRecord> {
        if self.tariffs.get(record.tier()).is_some() {
            return None;
        }
        let error = TurnstileError::InconsistentRecord {
            subscriber_id: record.subscriber_id(),
            tier: record.tier().clone(),
        };
        tracing::error!(%error, "record skipped");
        Some(InconsistentRecord {
            subscriber_id: record.subscriber_id(),
            tier: record.tier().clone(),
        })
    }

    fn subscriber_lock(&self, subscriber_id: SubscriberId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(subscriber_id).or_default().clone()
    }

    fn release_unused_locks(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use turnstile_channel::{ChannelError, MemoryChannel, MemoryMessenger};
    use turnstile_core::{ChannelId, ConfigurationError};
    use turnstile_store::MemoryStore;

    type TestEngine = LifecycleEngine<MemoryStore, MemoryChannel, MemoryMessenger>;

    struct Harness {
        engine: Arc<TestEngine>,
        clock: ManualClock,
        channel: MemoryChannel,
        messenger: MemoryMessenger,
    }

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(t0());
        let channel = MemoryChannel::new();
        let messenger = MemoryMessenger::new();
        let engine = LifecycleEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(channel.clone()),
            Arc::new(messenger.clone()),
            TariffTable::standard(),
            Arc::new(clock.clone()),
            EngineConfig::new(ChannelId(-100_777)),
        );
        Harness {
            engine: Arc::new(engine),
            clock,
            channel,
            messenger,
        }
    }

    fn sub(n: i64) -> SubscriberId {
        SubscriberId::new(n)
    }

    #[tokio::test]
    async fn test_activate_issues_invite_and_persists() {
        let h = harness();

        let activation = h
            .engine
            .activate(ActivationRequest::new(sub(1), "1_month"))
            .await
            .unwrap();

        assert_eq!(activation.outcome, ActivationOutcome::Activated);
        assert_eq!(activation.record.access_until(), t0() + Duration::days(30));
        assert_eq!(activation.duration_days(), 30);

        let invites = h.channel.invites().await;
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0].label, "sub_1");
        assert_eq!(activation.record.invite_token(), Some(&invites[0].token));

        let stored = h.engine.store().get(sub(1)).await.unwrap().unwrap();
        assert_eq!(stored, activation.record);
    }

    #[tokio::test]
    async fn test_unknown_tier_is_configuration_error() {
        let h = harness();

        let err = h
            .engine
            .activate(ActivationRequest::new(sub(1), "2_weeks"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TurnstileError::Configuration(ConfigurationError::UnknownTier(_))
        ));
        assert!(h.channel.invites().await.is_empty());
    }

    #[tokio::test]
    async fn test_issuance_failure_writes_nothing_and_is_observable() {
        let h = harness();
        h.channel
            .fail_next_invite(ChannelError::Transport("connection reset".into()))
            .await;

        let err = h
            .engine
            .activate(ActivationRequest::new(sub(5), "3_months").payment(PaymentId::new("pay-1")))
            .await
            .unwrap_err();

        assert!(matches!(err, TurnstileError::InvitationIssuance { .. }));
        assert!(h.engine.store().get(sub(5)).await.unwrap().is_none());

        let failures = h.engine.store().provisioning_failures().await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].payment_id, Some(PaymentId::new("pay-1")));

        // A later successful activation resolves the failure.
        h.engine
            .activate(ActivationRequest::new(sub(5), "3_months"))
            .await
            .unwrap();
        assert!(h.engine.store().provisioning_failures().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repurchase_restarts_window() {
        let h = harness();
        h.engine
            .activate(ActivationRequest::new(sub(2), "1_month"))
            .await
            .unwrap();

        h.clock.advance(Duration::days(10));
        let renewed = h
            .engine
            .activate(ActivationRequest::new(sub(2), "1_month"))
            .await
            .unwrap();

        assert_eq!(renewed.outcome, ActivationOutcome::Renewed);
        assert_eq!(
            renewed.record.access_until(),
            t0() + Duration::days(10) + Duration::days(30)
        );
        assert_eq!(h.engine.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_payment_issues_one_invite() {
        let h = harness();
        let request =
            ActivationRequest::new(sub(3), "6_months").payment(PaymentId::new("charge-42"));

        let (a, b) = tokio::join!(
            h.engine.activate(request.clone()),
            h.engine.activate(request.clone())
        );
        let mut outcomes = vec![a.unwrap().outcome, b.unwrap().outcome];
        outcomes.sort_by_key(|o| *o as u8);

        assert_eq!(
            outcomes,
            vec![ActivationOutcome::Activated, ActivationOutcome::AlreadyActive]
        );
        assert_eq!(h.channel.invites().await.len(), 1);
    }

    #[tokio::test]
    async fn test_check_access_boundary_is_exclusive() {
        let h = harness();
        let activation = h
            .engine
            .activate(ActivationRequest::new(sub(4), "1_month"))
            .await
            .unwrap();
        let until = activation.record.access_until();

        let before = h.engine.check_access(sub(4), until - Duration::seconds(1)).await.unwrap();
        assert!(before.is_active());

        let at = h.engine.check_access(sub(4), until).await.unwrap();
        assert_eq!(at, AccessStatus::Inactive);

        assert_eq!(
            h.engine.check_access(sub(99), t0()).await.unwrap(),
            AccessStatus::Inactive
        );
    }

    #[tokio::test]
    async fn test_scan_expired_revokes_notifies_and_deletes() {
        let h = harness();
        let activation = h
            .engine
            .activate(ActivationRequest::new(sub(7), "1_month"))
            .await
            .unwrap();
        let until = activation.record.access_until();

        let report = h.engine.scan_expired(until).await.unwrap();

        assert_eq!(report.outcome_of(sub(7)), Some(&ExpiryOutcome::Completed));
        let revocations = h.channel.revocations().await;
        assert_eq!(revocations.len(), 1);
        assert_eq!(revocations[0].until, until + Duration::days(365));
        assert_eq!(h.messenger.messages_to(sub(7)).await.len(), 1);
        assert!(h.engine.store().get(sub(7)).await.unwrap().is_none());

        // Nothing left to do on a second pass.
        let again = h.engine.scan_expired(until + Duration::hours(1)).await.unwrap();
        assert!(again.outcomes.is_empty());
        assert_eq!(h.channel.revocations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_revocation_keeps_record_for_next_tick() {
        let h = harness();
        h.engine
            .activate(ActivationRequest::new(sub(8), "1_month"))
            .await
            .unwrap();
        h.channel
            .fail_revocations_of(sub(8), ChannelError::RateLimited { retry_after: None })
            .await;

        let at = t0() + Duration::days(31);
        let report = h.engine.scan_expired(at).await.unwrap();

        assert!(matches!(
            report.outcome_of(sub(8)),
            Some(ExpiryOutcome::RevocationDeferred { .. })
        ));
        assert!(h.engine.store().get(sub(8)).await.unwrap().is_some());
        assert!(h.messenger.messages_to(sub(8)).await.is_empty());

        h.channel.clear_faults().await;
        let retry = h.engine.scan_expired(at + Duration::hours(6)).await.unwrap();
        assert_eq!(retry.outcome_of(sub(8)), Some(&ExpiryOutcome::Completed));
        assert_eq!(h.channel.revoke_attempts().await, 2);
    }

    #[tokio::test]
    async fn test_failed_notice_still_deletes() {
        let h = harness();
        h.engine
            .activate(ActivationRequest::new(sub(9), "1_month"))
            .await
            .unwrap();
        h.messenger
            .make_unreachable(sub(9), ChannelError::Rejected("bot was blocked by the user".into()))
            .await;

        let report = h.engine.scan_expired(t0() + Duration::days(30)).await.unwrap();

        assert!(matches!(
            report.outcome_of(sub(9)),
            Some(ExpiryOutcome::CompletedWithoutNotice { .. })
        ));
        assert!(h.engine.store().get(sub(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let h = harness();
        for n in 10..15 {
            h.engine
                .activate(ActivationRequest::new(sub(n), "1_month"))
                .await
                .unwrap();
        }
        h.channel
            .fail_revocations_of(sub(12), ChannelError::Transport("timeout".into()))
            .await;

        let report = h.engine.scan_expired(t0() + Duration::days(40)).await.unwrap();

        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.deleted(), 4);
        assert_eq!(report.deferred(), 1);
        assert_eq!(h.engine.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_record_is_skipped() {
        let h = harness();
        let stale = SubscriberRecord::restore(
            sub(20),
            Identity::default(),
            TierKey::from_stored("lifetime".to_string()),
            t0() - Duration::days(60),
            t0() - Duration::days(30),
            None,
            None,
        );
        h.engine.store().upsert(&stale).await.unwrap();

        let report = h.engine.scan_expired(t0()).await.unwrap();

        assert!(report.outcomes.is_empty());
        assert_eq!(report.inconsistent.len(), 1);
        assert_eq!(report.inconsistent[0].subscriber_id, sub(20));
        assert!(h.engine.store().get(sub(20)).await.unwrap().is_some());
        assert!(h.channel.revocations().await.is_empty());
    }

    #[tokio::test]
    async fn test_repurchase_between_plan_and_execution_is_superseded() {
        let h = harness();
        h.engine
            .activate(ActivationRequest::new(sub(30), "1_month"))
            .await
            .unwrap();

        let at = t0() + Duration::days(31);
        let plan = h.engine.plan_expired(at).await.unwrap();
        assert_eq!(plan.actions.len(), 1);

        h.clock.set(at);
        h.engine
            .activate(ActivationRequest::new(sub(30), "1_year"))
            .await
            .unwrap();

        let outcome = h.engine.execute_expiry(plan.actions[0].clone(), at).await;
        assert_eq!(outcome, ExpiryOutcome::Superseded);
        assert!(h.channel.revocations().await.is_empty());
        assert!(h.engine.check_access(sub(30), at).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_scan_expiring_warns_without_mutating() {
        let h = harness();
        h.engine
            .activate(ActivationRequest::new(sub(40), "1_month"))
            .await
            .unwrap();
        h.engine
            .activate(ActivationRequest::new(sub(41), "1_year"))
            .await
            .unwrap();

        let at = t0() + Duration::days(29) + Duration::minutes(1);
        let report = h.engine.scan_expiring(at, Duration::days(1)).await.unwrap();

        assert_eq!(report.delivered, vec![sub(40)]);
        assert_eq!(h.messenger.messages_to(sub(40)).await.len(), 1);
        assert_eq!(h.engine.store().count().await.unwrap(), 2);

        // No deduplication: a second scan warns again.
        h.engine.scan_expiring(at, Duration::days(1)).await.unwrap();
        assert_eq!(h.messenger.messages_to(sub(40)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_locks_are_released() {
        let h = harness();
        h.engine
            .activate(ActivationRequest::new(sub(50), "1_month"))
            .await
            .unwrap();
        h.engine.scan_expired(t0() + Duration::days(31)).await.unwrap();

        assert!(h.engine.locks.lock().unwrap().is_empty());
    }
}
