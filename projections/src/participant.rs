//! Participant Aggregate Manager.
//!
//! Lookup-or-create for per-participant aggregates. Creation is a two-step
//! boundary, executed synchronously in this order:
//!
//! 1. increment `total_unique_participants` on the global aggregate, mark the
//!    participant as the last one registered, and persist it
//! 2. persist the zeroed [`ParticipantAggregate`]
//!
//! Both steps run only on the creation branch. A lookup that finds an existing
//! record touches nothing. If step 2 fails, the redelivered event takes the
//! creation branch again and step 1 sees the participant already registered.

use crate::global::GlobalAggregateManager;
use metrics::counter;
use staking_indexer_core::{
    Address, EntityStore, EntityStoreExt, ParticipantAggregate, Result, participant_key,
};
use std::sync::Arc;

/// Result of [`ParticipantAggregateManager::get_or_create`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParticipantLookup {
    /// The participant was already known.
    Existing(ParticipantAggregate),
    /// The participant was seen for the first time and has just been created.
    Created(ParticipantAggregate),
}

impl ParticipantLookup {
    /// Whether this lookup created the participant.
    #[must_use]
    pub const fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// The resolved aggregate.
    #[must_use]
    pub fn into_inner(self) -> ParticipantAggregate {
        match self {
            Self::Existing(aggregate) | Self::Created(aggregate) => aggregate,
        }
    }
}

/// Lazily creates and persists [`ParticipantAggregate`]s.
pub struct ParticipantAggregateManager<S> {
    store: Arc<S>,
    global: GlobalAggregateManager<S>,
}

impl<S: EntityStore> ParticipantAggregateManager<S> {
    /// Create a manager that reports new participants to `global`.
    #[must_use]
    pub const fn new(store: Arc<S>, global: GlobalAggregateManager<S>) -> Self {
        Self { store, global }
    }

    /// Load a participant without creating it.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the load fails.
    pub async fn get(&self, id: Address) -> Result<Option<ParticipantAggregate>> {
        self.store.load_entity(&participant_key(&id)).await
    }

    /// Load a participant, creating it on first sight.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if any load or write fails. Retrying the
    /// same lookup after a failure counts the participant exactly once.
    pub async fn get_or_create(&self, id: Address) -> Result<ParticipantLookup> {
        if let Some(existing) = self.get(id).await? {
            return Ok(ParticipantLookup::Existing(existing));
        }

        let global = self.global.register_participant(id).await?;
        let participant = ParticipantAggregate::new(id);
        self.store.store_entity(&participant).await?;

        counter!("staking_indexer_participants_created_total").increment(1);
        tracing::debug!(
            participant = %id,
            total_unique_participants = global.total_unique_participants,
            "Created participant aggregate"
        );

        Ok(ParticipantLookup::Created(participant))
    }

    /// Persist a mutated participant.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the write fails.
    pub async fn save(&self, participant: &ParticipantAggregate) -> Result<()> {
        self.store.store_entity(participant).await
    }
}
