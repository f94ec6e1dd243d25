//! Global Aggregate Manager.
//!
//! Owns access to the singleton [`GlobalAggregate`]. The record is created with
//! every counter at zero the first time anything asks for it, and is never
//! deleted. Access is lazy on every call: there is no cached copy, so a mutation
//! persisted by one step is what the next step loads.

use staking_indexer_core::{
    Address, EntityStore, EntityStoreExt, GLOBAL_ID, GlobalAggregate, Result,
};
use std::sync::Arc;

/// Lazily creates and persists the [`GlobalAggregate`].
pub struct GlobalAggregateManager<S> {
    store: Arc<S>,
}

impl<S> Clone for GlobalAggregateManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EntityStore> GlobalAggregateManager<S> {
    /// Create a manager over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Load the global aggregate, creating and persisting a zeroed one if absent.
    ///
    /// Repeated calls without an intervening [`save`](Self::save) return equal
    /// records. Callers persist their own mutations.
    ///
    /// # Errors
    ///
    /// Returns a storage-class [`IndexerError`](staking_indexer_core::IndexerError)
    /// if the load or the initial persist fails.
    pub async fn get_or_init(&self) -> Result<GlobalAggregate> {
        if let Some(global) = self.store.load_entity::<GlobalAggregate>(GLOBAL_ID).await? {
            return Ok(global);
        }

        let global = GlobalAggregate::default();
        self.store.store_entity(&global).await?;
        tracing::debug!("Initialized global aggregate");
        Ok(global)
    }

    /// Persist a mutated global aggregate.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the write fails.
    pub async fn save(&self, global: &GlobalAggregate) -> Result<()> {
        self.store.store_entity(global).await
    }

    /// Count `participant` as newly seen and persist the result.
    ///
    /// Only [`ParticipantAggregateManager`](crate::ParticipantAggregateManager)
    /// calls this, and only on its creation branch. If `participant` is already
    /// the last one registered, the count is left alone: the previous attempt
    /// counted it but its participant write never landed.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the load or write fails.
    pub async fn register_participant(&self, participant: Address) -> Result<GlobalAggregate> {
        let mut global = self.get_or_init().await?;
        if global.last_registered == Some(participant) {
            tracing::debug!(%participant, "Participant already counted");
            return Ok(global);
        }

        global.total_unique_participants = global.total_unique_participants.saturating_add(1);
        global.last_registered = Some(participant);
        self.save(&global).await?;
        Ok(global)
    }
}
