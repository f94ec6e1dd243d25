//! # Staking Indexer Testing
//!
//! Testing utilities for the staking ledger indexer.
//!
//! This crate provides:
//! - In-memory doubles for the entity store, checkpoint and event source
//! - A fault-injecting entity store
//! - [`EventFactory`] fixtures with unique provenance
//! - [`DispatcherTestHarness`] for given/then dispatcher tests
//! - proptest strategies for generated ledger histories
//!
//! ## Example
//!
//! ```ignore
//! use staking_indexer_testing::{DispatcherTestHarness, EventFactory};
//!
//! #[tokio::test]
//! async fn stake_creates_participant() {
//!     let mut harness = DispatcherTestHarness::new();
//!     let mut events = EventFactory::new();
//!     let user = Address::repeat_byte(0x12);
//!
//!     harness.given_events([events.staked(user, 1000, 5000, 100)]).await.unwrap();
//!
//!     assert_eq!(harness.global().unwrap().total_unique_participants, 1);
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod properties;
pub mod source_mocks;
pub mod store_mocks;

pub use fixtures::EventFactory;
pub use harness::DispatcherTestHarness;
pub use source_mocks::InMemoryEventSource;
pub use store_mocks::{FailingEntityStore, InMemoryCheckpoint, InMemoryEntityStore};

use tracing_subscriber::EnvFilter;

/// Install a test-friendly `tracing` subscriber.
///
/// Honors `RUST_LOG`, defaulting to `warn`. Safe to call from every test:
/// only the first call installs anything.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // Fails once a subscriber is installed, which is the idempotence we want.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
