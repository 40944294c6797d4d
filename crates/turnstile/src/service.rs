//! Wiring: builds the engine, scheduler and dispatcher from one
//! configuration around one shared store.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use turnstile_channel::{ChannelControl, Messenger};
use turnstile_store::{SqliteStore, SubscriptionStore};

use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::LifecycleEngine;
use crate::error::Result;
use crate::reconciler::Reconciler;

/// A fully wired service.
pub struct Service<S, C, M> {
    pub engine: Arc<LifecycleEngine<S, C, M>>,
    pub reconciler: Arc<Reconciler<S, C, M>>,
    pub dispatcher: Dispatcher<S, C, M>,
}

impl<C, M> Service<SqliteStore, C, M>
where
    C: ChannelControl + 'static,
    M: Messenger + 'static,
{
    /// Validate `config`, open the SQLite database it names and wire
    /// everything against the system clock.
    pub fn open(config: &ServiceConfig, channel: C, messenger: M) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::open(&config.database_path)?;
        tracing::info!(
            database = %config.database_path.display(),
            tiers = config.tariffs.len(),
            "store opened"
        );
        Ok(Self::assemble(
            config,
            store,
            channel,
            messenger,
            Arc::new(SystemClock),
        ))
    }
}

impl<S, C, M> Service<S, C, M>
where
    S: SubscriptionStore + 'static,
    C: ChannelControl + 'static,
    M: Messenger + 'static,
{
    /// Wire an already validated configuration around `store`.
    pub fn assemble(
        config: &ServiceConfig,
        store: S,
        channel: C,
        messenger: M,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = Arc::new(LifecycleEngine::new(
            Arc::new(store),
            Arc::new(channel),
            Arc::new(messenger),
            config.tariffs.clone(),
            clock,
            config.engine(),
        ));
        let reconciler = Arc::new(Reconciler::new(engine.clone(), config.schedule()));
        let dispatcher = Dispatcher::new(engine.clone(), config.dispatcher());
        Self {
            engine,
            reconciler,
            dispatcher,
        }
    }

    /// Start the reconciliation schedules in the background.
    pub fn start_reconciler(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        self.reconciler.clone().spawn(shutdown)
    }
}
