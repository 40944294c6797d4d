//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::{Arc, Once};

use chrono::{Duration, TimeZone, Utc};
use tracing_subscriber::filter::LevelFilter;

use turnstile::{
    Activation, ActivationRequest, Dispatcher, DispatcherConfig, EngineConfig, LifecycleEngine,
    ManualClock, Reconciler, ScheduleConfig,
};
use turnstile_channel::{MemoryChannel, MemoryMessenger};
use turnstile_core::{ChannelId, SubscriberId, TariffTable, Timestamp};
use turnstile_store::{MemoryStore, SubscriptionStore};

/// The restricted channel every fixture sells access to.
pub const CHANNEL: ChannelId = ChannelId(-100_200_300);

/// Engine over the in-memory store and collaborators.
pub type MemoryEngine<S = MemoryStore> = LifecycleEngine<S, MemoryChannel, MemoryMessenger>;

/// Start of every fixture's clock: 2026-01-15 12:00 UTC.
pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

/// Install a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(LevelFilter::DEBUG)
            .try_init();
    });
}

/// An engine with a manual clock and recording collaborators.
pub struct TestFixture<S = MemoryStore> {
    pub clock: ManualClock,
    pub channel: MemoryChannel,
    pub messenger: MemoryMessenger,
    pub engine: Arc<MemoryEngine<S>>,
}

impl TestFixture<MemoryStore> {
    /// Standard tariffs, in-memory store, clock at [`t0`].
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Custom tariffs over an in-memory store.
    pub fn with_tariffs(tariffs: TariffTable) -> Self {
        Self::build(MemoryStore::new(), tariffs, EngineConfig::new(CHANNEL))
    }
}

impl Default for TestFixture<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SubscriptionStore + 'static> TestFixture<S> {
    /// Standard tariffs over `store`.
    pub fn with_store(store: S) -> Self {
        Self::build(store, TariffTable::standard(), EngineConfig::new(CHANNEL))
    }

    /// Full control over store, tariffs and engine settings.
    pub fn build(store: S, tariffs: TariffTable, config: EngineConfig) -> Self {
        let clock = ManualClock::new(t0());
        let channel = MemoryChannel::new();
        let messenger = MemoryMessenger::new();
        let engine = LifecycleEngine::new(
            Arc::new(store),
            Arc::new(channel.clone()),
            Arc::new(messenger.clone()),
            tariffs,
            Arc::new(clock.clone()),
            config,
        );
        Self {
            clock,
            channel,
            messenger,
            engine: Arc::new(engine),
        }
    }

    pub fn now(&self) -> Timestamp {
        use turnstile::Clock;
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Activate `tier` for subscriber `id` at the current time.
    ///
    /// Panics if the activation fails.
    pub async fn activate(&self, id: i64, tier: &str) -> Activation {
        self.engine
            .activate(ActivationRequest::new(SubscriberId::new(id), tier))
            .await
            .unwrap_or_else(|e| panic!("activation of {} for {} failed: {}", tier, id, e))
    }

    /// A scheduler over this fixture's engine.
    pub fn reconciler(&self, schedule: ScheduleConfig) -> Arc<Reconciler<S, MemoryChannel, MemoryMessenger>> {
        Arc::new(Reconciler::new(self.engine.clone(), schedule))
    }

    /// A dispatcher over this fixture's engine.
    pub fn dispatcher(&self, admin: Option<SubscriberId>) -> Dispatcher<S, MemoryChannel, MemoryMessenger> {
        Dispatcher::new(
            self.engine.clone(),
            DispatcherConfig {
                channel: CHANNEL,
                bot: None,
                admin,
                currency: "RUB".to_string(),
                provider_token: "provider-test-token".to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_activation() {
        let fixture = TestFixture::new();
        let activation = fixture.activate(1, "1_month").await;

        assert_eq!(activation.record.access_until(), t0() + Duration::days(30));
        assert_eq!(fixture.channel.invites().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fixture_clock_is_shared() {
        let fixture = TestFixture::new();
        fixture.advance(Duration::days(3));
        assert_eq!(fixture.engine.now(), t0() + Duration::days(3));
    }
}
