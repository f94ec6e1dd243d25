//! Event Recorder.
//!
//! Writes one immutable historical record per processed event. Records are
//! keyed by [`RecordId`](staking_indexer_core::RecordId), derived from the
//! event's transaction hash and log index, and are never updated or deleted
//! after creation. Rewriting an identical record, as an exact redelivery
//! would, leaves the store unchanged.

use staking_indexer_core::{
    ClaimRecord, EmergencyWithdrawRecord, EntityStore, EntityStoreExt, EventRecord, LedgerEvent,
    RateUpdateRecord, Result, StakeRecord, StakingEvent, WithdrawRecord,
};
use std::sync::Arc;

/// Persists historical event records.
pub struct EventRecorder<S> {
    store: Arc<S>,
}

impl<S: EntityStore> EventRecorder<S> {
    /// Create a recorder over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persist `record` under its own kind and id.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the write fails.
    pub async fn record(&self, record: EventRecord) -> Result<EventRecord> {
        match &record {
            EventRecord::Stake(r) => self.store.store_entity(r).await?,
            EventRecord::Withdraw(r) => self.store.store_entity(r).await?,
            EventRecord::Claim(r) => self.store.store_entity(r).await?,
            EventRecord::RateUpdate(r) => self.store.store_entity(r).await?,
            EventRecord::EmergencyWithdraw(r) => self.store.store_entity(r).await?,
        }

        tracing::debug!(
            kind = %record.kind(),
            id = %record.id(),
            "Recorded historical event"
        );
        Ok(record)
    }
}

/// Build the historical record for `event`.
///
/// Initialization produces no record.
#[must_use]
pub fn record_for(event: &LedgerEvent) -> Option<EventRecord> {
    let provenance = event.provenance;
    let id = provenance.record_id();

    let record = match &event.event {
        StakingEvent::Initialized(_) => return None,
        StakingEvent::Staked(e) => EventRecord::Stake(StakeRecord {
            id,
            user: e.user,
            amount: e.amount,
            timestamp: e.timestamp,
            total_staked: e.new_total_staked,
            provenance,
        }),
        StakingEvent::Withdrawn(e) => EventRecord::Withdraw(WithdrawRecord {
            id,
            user: e.user,
            amount: e.amount,
            timestamp: e.timestamp,
            total_staked: e.new_total_staked,
            rewards_accrued: e.rewards_accrued,
            provenance,
        }),
        StakingEvent::RewardsClaimed(e) => EventRecord::Claim(ClaimRecord {
            id,
            user: e.user,
            amount: e.amount,
            timestamp: e.timestamp,
            new_pending_rewards: e.new_pending_rewards,
            provenance,
        }),
        StakingEvent::RewardRateUpdated(e) => EventRecord::RateUpdate(RateUpdateRecord {
            id,
            old_rate: e.old_rate,
            new_rate: e.new_rate,
            timestamp: e.timestamp,
            provenance,
        }),
        StakingEvent::EmergencyWithdrawn(e) => {
            EventRecord::EmergencyWithdraw(EmergencyWithdrawRecord {
                id,
                user: e.user,
                amount: e.amount,
                penalty: e.penalty,
                timestamp: e.timestamp,
                total_staked: e.new_total_staked,
                provenance,
            })
        }
    };

    Some(record)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use staking_indexer_core::{Address, EntityKind, U256};
    use staking_indexer_testing::{EventFactory, InMemoryEntityStore};

    #[tokio::test]
    async fn record_persists_under_kind_and_id() {
        let store = Arc::new(InMemoryEntityStore::new());
        let recorder = EventRecorder::new(Arc::clone(&store));
        let mut events = EventFactory::new();
        let event = events.staked(Address::repeat_byte(1), 1000, 5000, 100);

        let record = record_for(&event).unwrap();
        let id = record.id().clone();
        recorder.record(record).await.unwrap();

        let stored: StakeRecord = store.get_entity(id.as_str()).unwrap();
        assert_eq!(stored.amount, U256::from(1000));
        assert_eq!(stored.total_staked, U256::from(5000));
        assert_eq!(stored.provenance, event.provenance);
        assert_eq!(store.count(EntityKind::Stake), 1);
    }

    #[test]
    fn initialization_has_no_record() {
        let mut events = EventFactory::new();
        assert!(record_for(&events.initialized(Address::repeat_byte(9), 100)).is_none());
    }

    #[test]
    fn rate_update_record_has_no_participant() {
        let mut events = EventFactory::new();
        let record = record_for(&events.reward_rate_updated(100, 200, 4500)).unwrap();
        assert_eq!(record.kind(), EntityKind::RateUpdate);
        assert_eq!(record.participant(), None);
    }

    #[tokio::test]
    async fn same_kind_in_one_transaction_yields_two_records() {
        let store = Arc::new(InMemoryEntityStore::new());
        let recorder = EventRecorder::new(Arc::clone(&store));
        let mut events = EventFactory::new();
        let user = Address::repeat_byte(2);

        let first = events.staked(user, 10, 10, 1);
        let second = events.in_same_transaction(&first, 1).staked(user, 20, 30, 1);

        recorder.record(record_for(&first).unwrap()).await.unwrap();
        recorder.record(record_for(&second).unwrap()).await.unwrap();

        assert_eq!(store.count(EntityKind::Stake), 2);
    }
}
