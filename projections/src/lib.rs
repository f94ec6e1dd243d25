//! Aggregation core for the staking ledger indexer.
//!
//! # Overview
//!
//! - [`EventDispatcher`]: folds one [`LedgerEvent`](staking_indexer_core::LedgerEvent)
//!   at a time into historical records and aggregates
//! - [`GlobalAggregateManager`] / [`ParticipantAggregateManager`]: lazy
//!   load-or-create access to the aggregates
//! - [`EventRecorder`]: one immutable record per event
//! - [`IndexerStream`]: drives the dispatcher from an event source, with checkpoints
//! - [`PostgresEntityStore`] / [`PostgresCheckpoint`]: durable storage
//!
//! # Example
//!
//! ```ignore
//! use staking_indexer_projections::*;
//!
//! let config = IndexerConfig::from_env()?;
//! let store = Arc::new(PostgresEntityStore::connect(&config).await?);
//! store.migrate().await?;
//! let checkpoint = Arc::new(PostgresCheckpoint::new(store.pool().clone()));
//!
//! let (stream, shutdown) = IndexerStream::new(
//!     EventDispatcher::new(store),
//!     source,
//!     checkpoint,
//!     config.projection_name.clone(),
//! );
//! let mut stream = stream.with_checkpoint_interval(config.checkpoint_interval);
//! stream.run().await?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod global;
pub mod metrics;
pub mod participant;
pub mod postgres;
pub mod recorder;
pub mod stream;

pub use config::{ConfigError, IndexerConfig};
pub use dispatcher::EventDispatcher;
pub use global::GlobalAggregateManager;
pub use participant::{ParticipantAggregateManager, ParticipantLookup};
pub use postgres::{PostgresCheckpoint, PostgresEntityStore};
pub use recorder::{EventRecorder, record_for};
pub use stream::{IndexerStream, RunSummary, StopReason};
