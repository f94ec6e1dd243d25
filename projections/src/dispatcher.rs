//! Event Dispatcher: the entry point of the aggregation core.
//!
//! For each event the dispatcher runs, in order:
//!
//! 1. validate the event (rejections happen here, before any write)
//! 2. resolve or create the participant aggregate, if the event names one
//! 3. write the historical record
//! 4. mutate and persist the participant aggregate, unless it already carries
//!    this event's record id from an earlier attempt
//! 5. resolve, mutate and persist the global aggregate
//!
//! | Event | Participant | Global |
//! |---|---|---|
//! | Initialized | none | `staking_token`, `current_reward_rate` |
//! | Staked | `staked_amount += amount`, `total_staked += amount`, `last_stake_timestamp` | `total_staked := reported`, `current_reward_rate := reported`, `cumulative_staked += amount` |
//! | Withdrawn | `staked_amount -= amount`, `total_withdrawn += amount`, `pending_rewards += accrued` | `total_staked := reported`, `current_reward_rate := reported` |
//! | RewardsClaimed | `pending_rewards := reported`, `total_rewards_claimed += amount` | `total_staked := reported`, `cumulative_rewards_distributed += amount` |
//! | RewardRateUpdated | none | `current_reward_rate := new`, `total_staked := reported` |
//! | EmergencyWithdrawn | `staked_amount := 0`, `pending_rewards := 0`, `total_withdrawn += amount` | `total_staked := reported` |
//!
//! Every touched aggregate gets `last_update_timestamp := block_timestamp`.
//!
//! Handlers take `&mut self`: one dispatcher can only ever be folding one event
//! at a time, and each handler runs to completion before the next begins.

use crate::global::GlobalAggregateManager;
use crate::participant::ParticipantAggregateManager;
use crate::recorder::{EventRecorder, record_for};
use metrics::{counter, histogram};
use staking_indexer_core::{
    Address, EmergencyWithdrawn, EntityStore, GlobalAggregate, LedgerEvent, ParticipantAggregate,
    Provenance, Result, RewardRateUpdated, RewardsClaimed, Staked, StakingEvent,
    StakingInitialized, U256, Withdrawn,
};
use std::sync::Arc;
use std::time::Instant;

/// Folds ledger events into historical records and aggregates.
pub struct EventDispatcher<S> {
    global: GlobalAggregateManager<S>,
    participants: ParticipantAggregateManager<S>,
    recorder: EventRecorder<S>,
}

impl<S: EntityStore> EventDispatcher<S> {
    /// Create a dispatcher whose managers all share `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        let global = GlobalAggregateManager::new(Arc::clone(&store));
        let participants = ParticipantAggregateManager::new(Arc::clone(&store), global.clone());
        let recorder = EventRecorder::new(store);
        Self {
            global,
            participants,
            recorder,
        }
    }

    /// Global aggregate manager (read access for callers and tests).
    #[must_use]
    pub const fn global(&self) -> &GlobalAggregateManager<S> {
        &self.global
    }

    /// Participant aggregate manager (read access for callers and tests).
    #[must_use]
    pub const fn participants(&self) -> &ParticipantAggregateManager<S> {
        &self.participants
    }

    /// Validate `event` and route it to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::MalformedEvent`](staking_indexer_core::IndexerError::MalformedEvent)
    /// without touching any state if validation fails, or a storage-class
    /// error if any load or write fails part way.
    pub async fn dispatch(&mut self, event: &LedgerEvent) -> Result<()> {
        let kind = event.event.kind();
        if let Err(e) = event.validate() {
            counter!("staking_indexer_events_rejected_total", "reason" => e.label()).increment(1);
            tracing::warn!(
                kind,
                block_number = event.provenance.block_number,
                transaction_hash = %event.provenance.transaction_hash,
                log_index = event.provenance.log_index,
                error = %e,
                "Rejected malformed event"
            );
            return Err(e);
        }

        let started = Instant::now();
        let provenance = &event.provenance;
        let result = match &event.event {
            StakingEvent::Initialized(e) => self.handle_initialized(provenance, e).await,
            StakingEvent::Staked(e) => self.handle_staked(event, e).await,
            StakingEvent::Withdrawn(e) => self.handle_withdrawn(event, e).await,
            StakingEvent::RewardsClaimed(e) => self.handle_rewards_claimed(event, e).await,
            StakingEvent::RewardRateUpdated(e) => self.handle_reward_rate_updated(event, e).await,
            StakingEvent::EmergencyWithdrawn(e) => self.handle_emergency_withdrawn(event, e).await,
        };

        match &result {
            Ok(()) => {
                counter!("staking_indexer_events_processed_total", "kind" => kind).increment(1);
                histogram!("staking_indexer_dispatch_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::trace!(kind, block_number = provenance.block_number, "Applied event");
            }
            Err(e) => {
                tracing::error!(
                    kind,
                    block_number = provenance.block_number,
                    transaction_hash = %provenance.transaction_hash,
                    log_index = provenance.log_index,
                    error = %e,
                    "Failed to apply event"
                );
            }
        }

        result
    }

    /// Apply a ledger initialization.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if the global aggregate cannot be loaded or saved.
    pub async fn handle_initialized(
        &mut self,
        provenance: &Provenance,
        event: &StakingInitialized,
    ) -> Result<()> {
        let mut global = self.global.get_or_init().await?;
        global.staking_token = Some(event.staking_token);
        global.current_reward_rate = event.initial_reward_rate;
        global.last_update_timestamp = provenance.block_timestamp;
        self.global.save(&global).await?;

        tracing::info!(
            staking_token = %event.staking_token,
            initial_reward_rate = %event.initial_reward_rate,
            "Staking ledger initialized"
        );
        Ok(())
    }

    /// Apply a stake.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if any load or write fails.
    pub async fn handle_staked(&mut self, source: &LedgerEvent, event: &Staked) -> Result<()> {
        self.fold_participant(event.user, source, |participant| {
            participant.staked_amount = participant.staked_amount.saturating_add(event.amount);
            participant.total_staked = participant.total_staked.saturating_add(event.amount);
            participant.last_stake_timestamp = event.timestamp;
        })
        .await?;

        self.update_global(&source.provenance, |global| {
            global.total_staked = event.new_total_staked;
            global.current_reward_rate = event.current_reward_rate;
            global.cumulative_staked = global.cumulative_staked.saturating_add(event.amount);
        })
        .await
    }

    /// Apply a withdrawal.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if any load or write fails.
    pub async fn handle_withdrawn(
        &mut self,
        source: &LedgerEvent,
        event: &Withdrawn,
    ) -> Result<()> {
        self.fold_participant(event.user, source, |participant| {
            participant.staked_amount = debit(participant.staked_amount, event.amount, &event.user);
            participant.total_withdrawn = participant.total_withdrawn.saturating_add(event.amount);
            participant.pending_rewards = participant
                .pending_rewards
                .saturating_add(event.rewards_accrued);
        })
        .await?;

        self.update_global(&source.provenance, |global| {
            global.total_staked = event.new_total_staked;
            global.current_reward_rate = event.current_reward_rate;
        })
        .await
    }

    /// Apply a reward claim.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if any load or write fails.
    pub async fn handle_rewards_claimed(
        &mut self,
        source: &LedgerEvent,
        event: &RewardsClaimed,
    ) -> Result<()> {
        self.fold_participant(event.user, source, |participant| {
            participant.pending_rewards = event.new_pending_rewards;
            participant.total_rewards_claimed = participant
                .total_rewards_claimed
                .saturating_add(event.amount);
        })
        .await?;

        self.update_global(&source.provenance, |global| {
            global.total_staked = event.total_staked;
            global.cumulative_rewards_distributed = global
                .cumulative_rewards_distributed
                .saturating_add(event.amount);
        })
        .await
    }

    /// Apply a reward-rate change.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if any load or write fails.
    pub async fn handle_reward_rate_updated(
        &mut self,
        source: &LedgerEvent,
        event: &RewardRateUpdated,
    ) -> Result<()> {
        self.record(source).await?;

        self.update_global(&source.provenance, |global| {
            global.current_reward_rate = event.new_rate;
            global.total_staked = event.total_staked;
        })
        .await
    }

    /// Apply an emergency withdrawal.
    ///
    /// # Errors
    ///
    /// Returns a storage-class error if any load or write fails.
    pub async fn handle_emergency_withdrawn(
        &mut self,
        source: &LedgerEvent,
        event: &EmergencyWithdrawn,
    ) -> Result<()> {
        self.fold_participant(event.user, source, |participant| {
            participant.staked_amount = U256::ZERO;
            participant.pending_rewards = U256::ZERO;
            participant.total_withdrawn = participant.total_withdrawn.saturating_add(event.amount);
        })
        .await?;

        self.update_global(&source.provenance, |global| {
            global.total_staked = event.new_total_staked;
        })
        .await
    }

    /// Resolve the participant, write the record, then apply `mutate` unless
    /// the stored aggregate already reflects this event.
    async fn fold_participant<F>(
        &self,
        user: Address,
        source: &LedgerEvent,
        mutate: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut ParticipantAggregate) + Send,
    {
        let mut participant = self.participants.get_or_create(user).await?.into_inner();
        self.record(source).await?;

        let record_id = source.provenance.record_id();
        if participant.last_applied.as_ref() == Some(&record_id) {
            tracing::debug!(
                participant = %user,
                record_id = %record_id,
                "Participant already reflects event"
            );
            return Ok(());
        }

        mutate(&mut participant);
        participant.last_update_timestamp = source.provenance.block_timestamp;
        participant.last_applied = Some(record_id);
        self.participants.save(&participant).await
    }

    async fn record(&self, source: &LedgerEvent) -> Result<()> {
        if let Some(record) = record_for(source) {
            self.recorder.record(record).await?;
        }
        Ok(())
    }

    async fn update_global<F>(&self, provenance: &Provenance, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut GlobalAggregate) + Send,
    {
        let mut global = self.global.get_or_init().await?;
        mutate(&mut global);
        global.last_update_timestamp = provenance.block_timestamp;
        self.global.save(&global).await
    }
}

/// Subtract a withdrawal from a staked balance, flooring at zero.
///
/// The ledger is trusted, so an over-withdrawal is logged rather than rejected.
fn debit(balance: U256, amount: U256, user: &Address) -> U256 {
    if amount > balance {
        tracing::warn!(
            participant = %user,
            %balance,
            %amount,
            "Withdrawal exceeds recorded stake, flooring at zero"
        );
    }
    balance.saturating_sub(amount)
}
