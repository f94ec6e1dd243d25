//! # Staking Indexer Core
//!
//! Core types and contracts for indexing a staking ledger's event stream.
//!
//! The indexer folds an ordered stream of ledger events into:
//!
//! - an append-only log of historical records, one per event, and
//! - continuously updated aggregates: one global summary plus one summary per
//!   participant.
//!
//! This crate holds the vocabulary only. The folding logic lives in
//! `staking-indexer-projections`; in-memory doubles live in
//! `staking-indexer-testing`.
//!
//! ## Modules
//!
//! - [`event`]: ledger events, provenance, the transport envelope
//! - [`entity`]: aggregates and historical records
//! - [`store`]: the entity store and checkpoint contracts
//! - [`source`]: the event source contract
//! - [`error`]: the error taxonomy
//!
//! ## Current vs. lifetime state
//!
//! Running totals the ledger reports (`total_staked`, the reward rate) are
//! copied from each event as-is. Lifetime counters (cumulative stake, rewards
//! distributed, unique participants) are summed locally, because no single
//! event carries their full history.

pub use alloy_primitives::{Address, B256, U256};
pub use chrono::{DateTime, Utc};

pub mod entity;
pub mod error;
pub mod event;
pub mod source;
pub mod store;

pub use entity::{
    ClaimRecord, EmergencyWithdrawRecord, Entity, EntityKind, EventRecord, GLOBAL_ID,
    GlobalAggregate, ParticipantAggregate, RateUpdateRecord, RecordId, StakeRecord,
    WithdrawRecord, participant_key,
};
pub use error::{IndexerError, Result};
pub use event::{
    EmergencyWithdrawn, Event, LedgerEvent, Provenance, RewardRateUpdated, RewardsClaimed,
    SerializedEvent, Staked, StakingEvent, StakingInitialized, Withdrawn,
};
pub use source::{EventSource, EventStream, SourceError};
pub use store::{Checkpoint, EntityStore, EntityStoreExt, EventPosition};
