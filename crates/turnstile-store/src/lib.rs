//! # Turnstile Store
//!
//! Storage abstraction for Turnstile. Provides a trait-based interface for
//! subscriber record persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts record storage behind the [`SubscriptionStore`]
//! trait, allowing the lifecycle engine to be storage-agnostic. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`SubscriptionStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`UpsertResult`] - Result of writing a record
//! - [`ProvisioningFailure`] - Evidence of a paid but unprovisioned activation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use turnstile_store::{SqliteStore, SubscriptionStore};
//! use turnstile_core::SubscriberId;
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("subscribers.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     // Look up a subscriber
//!     let record = store.get(SubscriberId::new(42)).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Replace, never merge**: `upsert` overwrites the whole record
//! - **Inclusive expiry**: `query_expired_as_of(t)` matches `access_until <= t`
//! - **Half-open warning window**: `query_expiring_within(t, w)` matches `[t, t + w)`
//! - **Guarded deletes**: `delete_expired` never removes a repurchased window

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ProvisioningFailure, SubscriptionStore, UpsertResult};
