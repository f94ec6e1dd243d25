//! Given/then harness for the event dispatcher.
//!
//! ```ignore
//! let mut harness = DispatcherTestHarness::new();
//! let mut events = EventFactory::new();
//!
//! harness
//!     .given_events([events.staked(user, 1000, 5000, 100)])
//!     .await?;
//!
//! assert_eq!(harness.participant(user).unwrap().staked_amount, U256::from(1000));
//! assert_eq!(harness.record_count(EntityKind::Stake), 1);
//! ```

use crate::store_mocks::InMemoryEntityStore;
use staking_indexer_core::{
    Address, Entity, EntityKind, GLOBAL_ID, GlobalAggregate, LedgerEvent, ParticipantAggregate,
    RecordId, Result, participant_key,
};
use staking_indexer_projections::EventDispatcher;
use std::sync::Arc;

/// Runs events through a real [`EventDispatcher`] over an in-memory store.
pub struct DispatcherTestHarness {
    store: Arc<InMemoryEntityStore>,
    dispatcher: EventDispatcher<InMemoryEntityStore>,
}

impl Default for DispatcherTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherTestHarness {
    /// Harness over a fresh, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryEntityStore::new()))
    }

    /// Harness over an existing store, e.g. one seeded by an earlier harness.
    #[must_use]
    pub fn with_store(store: Arc<InMemoryEntityStore>) -> Self {
        let dispatcher = EventDispatcher::new(Arc::clone(&store));
        Self { store, dispatcher }
    }

    /// Dispatch events in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first dispatch error.
    pub async fn given_events(
        &mut self,
        events: impl IntoIterator<Item = LedgerEvent>,
    ) -> Result<&mut Self> {
        for event in events {
            self.dispatcher.dispatch(&event).await?;
        }
        Ok(self)
    }

    /// Dispatch one event.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error.
    pub async fn given_event(&mut self, event: &LedgerEvent) -> Result<&mut Self> {
        self.dispatcher.dispatch(event).await?;
        Ok(self)
    }

    /// The stored global aggregate, if it has been created.
    #[must_use]
    pub fn global(&self) -> Option<GlobalAggregate> {
        self.store.get_entity(GLOBAL_ID)
    }

    /// The stored aggregate for `id`, if it has been created.
    #[must_use]
    pub fn participant(&self, id: Address) -> Option<ParticipantAggregate> {
        self.store.get_entity(&participant_key(&id))
    }

    /// The stored historical record `id`.
    #[must_use]
    pub fn record<T: Entity>(&self, id: &RecordId) -> Option<T> {
        self.store.get_entity(id.as_str())
    }

    /// Number of stored entities of `kind`.
    #[must_use]
    pub fn record_count(&self, kind: EntityKind) -> usize {
        self.store.count(kind)
    }

    /// The backing store.
    #[must_use]
    pub const fn store(&self) -> &Arc<InMemoryEntityStore> {
        &self.store
    }

    /// The dispatcher under test.
    pub const fn dispatcher(&mut self) -> &mut EventDispatcher<InMemoryEntityStore> {
        &mut self.dispatcher
    }
}
