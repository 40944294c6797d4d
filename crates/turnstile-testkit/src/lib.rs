//! # Turnstile Testkit
//!
//! Testing utilities for Turnstile.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an engine wired to a manual clock and recording
//!   collaborators
//! - **Generators**: Proptest strategies for tariffs, tiers and time offsets
//! - **Stores**: store doubles with injected write faults
//!
//! ## Test Fixtures
//!
//! ```rust
//! use turnstile_testkit::fixtures::TestFixture;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let fixture = TestFixture::new();
//! let activation = fixture.activate(1, "3_months").await;
//! assert_eq!(activation.duration_days(), 90);
//! # });
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use turnstile_testkit::generators::tariff_table;
//!
//! proptest! {
//!     #[test]
//!     fn every_tier_resolves(table in tariff_table()) {
//!         for tier in table.iter() {
//!             prop_assert!(table.get(&tier.key).is_some());
//!         }
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod stores;

pub use fixtures::{init_tracing, t0, MemoryEngine, TestFixture, CHANNEL};
pub use generators::{offset, subscriber_id, tariff_table, tier, tier_key};
pub use stores::UnwritableStore;
