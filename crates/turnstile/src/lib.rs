//! # Turnstile
//!
//! Paid, time-bounded access to a restricted channel.
//!
//! ## Overview
//!
//! Turnstile sells subscriptions through a payment flow and enforces them:
//!
//! - **Activation**: a confirmed payment starts a fresh access window and
//!   issues a single-use invitation
//! - **Access checks**: a subscriber is active while `access_until` lies
//!   strictly in the future
//! - **Reconciliation**: a background scheduler revokes expired members,
//!   tells them, deletes their records, and warns those about to expire
//!
//! ## Key Concepts
//!
//! - **Access window**: `[purchased_at, access_until)`. A repurchase
//!   replaces the window; remaining time never stacks.
//! - **Retry policy**: a failed revocation keeps the record for the next
//!   tick; a failed notification is dropped.
//! - **Provisioning failure**: paid but not provisioned, recorded in the
//!   store for manual follow-up.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use turnstile::{Service, ServiceConfig};
//! use turnstile::channel::{MemoryChannel, MemoryMessenger};
//!
//! async fn example() {
//!     let config = ServiceConfig::load("turnstile.toml").unwrap();
//!     let service = Service::open(&config, MemoryChannel::new(), MemoryMessenger::new()).unwrap();
//!
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let reconciler = service.start_reconciler(shutdown_rx);
//!
//!     // Feed inbound events to service.dispatcher.handle(..)
//!
//!     shutdown_tx.send(true).unwrap();
//!     reconciler.await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `turnstile::core` - Records, tariffs, payload contract
//! - `turnstile::store` - Store trait, SQLite and in-memory backends
//! - `turnstile::channel` - Collaborator traits and message types

pub mod actions;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod reconciler;
pub mod service;
pub mod texts;

// Re-export component crates
pub use turnstile_channel as channel;
pub use turnstile_core as core;
pub use turnstile_store as store;

// Re-export main types for convenience
pub use actions::{
    ActionKind, Activation, ActivationOutcome, ExpiryAction, ExpiryOutcome, ExpiryPlan,
    ExpiryReport, InconsistentRecord, RetryPolicy, WarnAction, WarnPlan, WarnReport,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DispatcherConfig, EngineConfig, ScheduleConfig, ServiceConfig};
pub use dispatcher::Dispatcher;
pub use engine::{ActivationRequest, LifecycleEngine};
pub use error::{Result, TurnstileError};
pub use reconciler::{until_next_daily, Reconciler};
pub use service::Service;
pub use texts::Screens;

// Re-export commonly used core types
pub use turnstile_core::{
    AccessStatus, Identity, LifecycleState, PaymentId, SubscriberId, SubscriberRecord,
    TariffTable, Tier, TierKey, Timestamp,
};
