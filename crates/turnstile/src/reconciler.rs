//! Reconciliation scheduler.
//!
//! Runs the expiry scan every `expiry_interval` (first after
//! `first_run_delay`) and the expiring-soon scan once a day at
//! `warning_time`. Scans never overlap: a tick that arrives while a scan of
//! the same kind is running is skipped.
//!
//! Both loops listen for a shutdown signal and let the scan in progress
//! finish before returning.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use turnstile_channel::{ChannelControl, Messenger};
use turnstile_core::Timestamp;
use turnstile_store::SubscriptionStore;

use crate::actions::{ExpiryReport, WarnReport};
use crate::config::ScheduleConfig;
use crate::engine::LifecycleEngine;
use crate::error::Result;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Drives the lifecycle engine's scans on a schedule.
pub struct Reconciler<S, C, M> {
    engine: Arc<LifecycleEngine<S, C, M>>,
    schedule: ScheduleConfig,
    expiry_running: Mutex<()>,
    warning_running: Mutex<()>,
}

impl<S, C, M> Reconciler<S, C, M>
where
    S: SubscriptionStore + 'static,
    C: ChannelControl + 'static,
    M: Messenger + 'static,
{
    pub fn new(engine: Arc<LifecycleEngine<S, C, M>>, schedule: ScheduleConfig) -> Self {
        Self {
            engine,
            schedule,
            expiry_running: Mutex::new(()),
            warning_running: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &LifecycleEngine<S, C, M> {
        &self.engine
    }

    /// Run one expiry scan at the current time.
    ///
    /// Returns `None` if another expiry scan is still in progress.
    pub async fn run_expiry_once(&self) -> Option<Result<ExpiryReport>> {
        let Ok(_running) = self.expiry_running.try_lock() else {
            tracing::warn!("expiry scan still in progress; tick skipped");
            return None;
        };
        let at = self.engine.now();
        Some(self.engine.scan_expired(at).await)
    }

    /// Run one expiring-soon scan at the current time.
    ///
    /// Returns `None` if another expiring-soon scan is still in progress.
    pub async fn run_warning_once(&self) -> Option<Result<WarnReport>> {
        let Ok(_running) = self.warning_running.try_lock() else {
            tracing::warn!("expiring scan still in progress; tick skipped");
            return None;
        };
        let at = self.engine.now();
        let window = self.engine.config().warning_window;
        Some(self.engine.scan_expiring(at, window).await)
    }

    /// Run both schedules until `shutdown` turns true or its sender is
    /// dropped.
    ///
    /// Each schedule has its own loop, so a long expiry scan never delays
    /// the daily expiring-soon scan past its slot.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        tracing::info!(
            expiry_interval = ?self.schedule.expiry_interval,
            first_run_delay = ?self.schedule.first_run_delay,
            warning_time = %self.schedule.warning_time,
            "reconciler started"
        );

        tokio::join!(
            self.expiry_loop(shutdown.clone()),
            self.warning_loop(shutdown),
        );

        tracing::info!("reconciler stopped");
    }

    async fn expiry_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let start = Instant::now() + self.schedule.first_run_delay;
        let mut ticks = time::interval_at(start, self.schedule.expiry_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            // A branch body runs to completion once chosen; shutdown is only
            // observed between scans.
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = ticks.tick() => {
                    if let Some(Err(e)) = self.run_expiry_once().await {
                        tracing::error!(error = %e, "expiry scan failed; retrying next tick");
                    }
                }
            }
        }
    }

    async fn warning_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut deadline =
            Instant::now() + until_next_daily(self.engine.now(), self.schedule.warning_time);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = time::sleep_until(deadline) => {
                    deadline += DAY;
                    if let Some(Err(e)) = self.run_warning_once().await {
                        tracing::error!(error = %e, "expiring scan failed");
                    }
                }
            }
        }
    }

    /// Spawn [`Reconciler::run`] on the current runtime.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Time from `now` until the next occurrence of `time` (UTC).
///
/// An occurrence exactly at `now` counts as already past.
pub fn until_next_daily(now: Timestamp, time: NaiveTime) -> Duration {
    let today = now.date_naive().and_time(time).and_utc();
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::engine::ActivationRequest;
    use chrono::{TimeZone, Utc};
    use turnstile_channel::{MemoryChannel, MemoryMessenger};
    use turnstile_core::{ChannelId, SubscriberId, TariffTable};
    use turnstile_store::MemoryStore;

    type TestReconciler = Reconciler<MemoryStore, MemoryChannel, MemoryMessenger>;

    fn reconciler(
        clock: &ManualClock,
        channel: &MemoryChannel,
        schedule: ScheduleConfig,
    ) -> Arc<TestReconciler> {
        let engine = LifecycleEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(channel.clone()),
            Arc::new(MemoryMessenger::new()),
            TariffTable::standard(),
            Arc::new(clock.clone()),
            EngineConfig::new(ChannelId(-100_1)),
        );
        Arc::new(Reconciler::new(Arc::new(engine), schedule))
    }

    #[test]
    fn test_until_next_daily() {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();

        let morning = Utc.with_ymd_and_hms(2026, 4, 2, 9, 0, 0).unwrap();
        assert_eq!(until_next_daily(morning, noon), Duration::from_secs(3 * 3600));

        let at_noon = Utc.with_ymd_and_hms(2026, 4, 2, 12, 0, 0).unwrap();
        assert_eq!(until_next_daily(at_noon, noon), Duration::from_secs(24 * 3600));

        let evening = Utc.with_ymd_and_hms(2026, 4, 2, 18, 30, 0).unwrap();
        assert_eq!(
            until_next_daily(evening, noon),
            Duration::from_secs(17 * 3600 + 30 * 60)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_expiry_tick_is_skipped() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let channel = MemoryChannel::new();
        let reconciler = reconciler(&clock, &channel, ScheduleConfig::default());

        reconciler
            .engine()
            .activate(ActivationRequest::new(SubscriberId::new(1), "1_month"))
            .await
            .unwrap();
        clock.advance(chrono::Duration::days(31));
        channel.set_latency(Duration::from_secs(2)).await;

        let first = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.run_expiry_once().await }
        });
        tokio::task::yield_now().await;
        time::sleep(Duration::from_millis(10)).await;

        assert!(reconciler.run_expiry_once().await.is_none());

        let report = first.await.unwrap().unwrap().unwrap();
        assert_eq!(report.deleted(), 1);
        assert_eq!(channel.revoke_attempts().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_and_stops_on_shutdown() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let channel = MemoryChannel::new();
        let schedule = ScheduleConfig {
            expiry_interval: Duration::from_secs(60),
            first_run_delay: Duration::from_secs(1),
            ..ScheduleConfig::default()
        };
        let reconciler = reconciler(&clock, &channel, schedule);

        reconciler
            .engine()
            .activate(ActivationRequest::new(SubscriberId::new(2), "1_month"))
            .await
            .unwrap();
        clock.advance(chrono::Duration::days(30));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = reconciler.clone().spawn(shutdown_rx);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(channel.revocations().await.len(), 1);
        assert_eq!(reconciler.engine().store().count().await.unwrap(), 0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_scan_in_flight() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let channel = MemoryChannel::new();
        let schedule = ScheduleConfig {
            first_run_delay: Duration::ZERO,
            ..ScheduleConfig::default()
        };
        let reconciler = reconciler(&clock, &channel, schedule);
        let id = SubscriberId::new(3);

        reconciler
            .engine()
            .activate(ActivationRequest::new(id, "1_month"))
            .await
            .unwrap();
        clock.advance(chrono::Duration::days(31));
        channel.set_latency(Duration::from_secs(5)).await;
        let notices_before = reconciler.engine().messenger().messages_to(id).await.len();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = reconciler.clone().spawn(shutdown_rx);

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(channel.revoke_attempts().await, 0);
        assert!(reconciler.engine().store().get(id).await.unwrap().is_some());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(channel.revocations().await.len(), 1);
        assert_eq!(
            reconciler.engine().messenger().messages_to(id).await.len(),
            notices_before + 1
        );
        assert!(reconciler.engine().store().get(id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_slot_not_lost_during_expiry_scan() {
        let day = Utc.with_ymd_and_hms(2026, 5, 20, 0, 0, 0).unwrap();
        let clock = ManualClock::new(day - chrono::Duration::days(31) + chrono::Duration::hours(9));
        let channel = MemoryChannel::new();
        let schedule = ScheduleConfig {
            first_run_delay: Duration::ZERO,
            ..ScheduleConfig::default()
        };
        let reconciler = reconciler(&clock, &channel, schedule);
        let lapsed = SubscriberId::new(10);
        let ending = SubscriberId::new(11);

        reconciler
            .engine()
            .activate(ActivationRequest::new(lapsed, "1_month"))
            .await
            .unwrap();
        clock.set(day - chrono::Duration::days(30) + chrono::Duration::hours(13));
        reconciler
            .engine()
            .activate(ActivationRequest::new(ending, "1_month"))
            .await
            .unwrap();

        // Two seconds before the noon slot; the expiry scan for `lapsed`
        // is still waiting on the channel when the slot arrives.
        clock.set(day + chrono::Duration::hours(12) - chrono::Duration::seconds(2));
        channel.set_latency(Duration::from_secs(5)).await;
        let before = reconciler.engine().messenger().messages_to(ending).await.len();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = reconciler.clone().spawn(shutdown_rx);

        time::sleep(Duration::from_secs(1)).await;
        clock.advance(chrono::Duration::seconds(3));
        time::sleep(Duration::from_secs(2 * 60 * 60)).await;

        let warned = reconciler.engine().messenger().messages_to(ending).await;
        assert_eq!(warned.len(), before + 1);
        assert!(warned[before].text.contains("2026-05-20"));
        assert!(reconciler.engine().store().get(lapsed).await.unwrap().is_none());
        assert!(reconciler.engine().store().get(ending).await.unwrap().is_some());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
