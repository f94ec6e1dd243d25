//! Ledger event fixtures.
//!
//! [`EventFactory`] hands out events with fresh provenance: every call gets a
//! new transaction hash, the next block, and a block time 12 seconds later.
//! Amounts are taken as `u64` and widened to `U256`.

use staking_indexer_core::{
    Address, B256, EmergencyWithdrawn, LedgerEvent, Provenance, RewardRateUpdated,
    RewardsClaimed, Staked, StakingEvent, StakingInitialized, U256, Withdrawn,
};

/// Block time of the block before the first generated one.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Seconds between generated blocks.
pub const BLOCK_TIME: u64 = 12;

/// Builds [`LedgerEvent`]s with unique provenance.
///
/// # Example
///
/// ```
/// use staking_indexer_testing::EventFactory;
/// use staking_indexer_core::Address;
///
/// let mut events = EventFactory::new();
/// let user = Address::repeat_byte(0x12);
/// let stake = events.staked(user, 1000, 5000, 100);
/// let claim = events.in_same_transaction(&stake, 1).rewards_claimed(user, 5, 0, 5000);
/// assert_eq!(stake.provenance.transaction_hash, claim.provenance.transaction_hash);
/// ```
#[derive(Clone, Debug)]
pub struct EventFactory {
    transactions: u64,
    block_number: u64,
    block_timestamp: u64,
    pinned: Option<Provenance>,
}

impl Default for EventFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFactory {
    /// Create a factory positioned just before block 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            transactions: 0,
            block_number: 0,
            block_timestamp: GENESIS_TIMESTAMP,
            pinned: None,
        }
    }

    /// Provenance for the next event.
    ///
    /// Returns the pinned provenance if one was set, else a fresh one.
    pub fn next_provenance(&mut self) -> Provenance {
        if let Some(provenance) = self.pinned.take() {
            return provenance;
        }
        self.transactions += 1;
        self.block_number += 1;
        self.block_timestamp += BLOCK_TIME;
        Provenance::new(
            B256::left_padding_from(&self.transactions.to_be_bytes()),
            0,
            self.block_number,
            self.block_timestamp,
        )
    }

    /// Give the next event the same transaction and block as `event`, at `log_index`.
    pub fn in_same_transaction(&mut self, event: &LedgerEvent, log_index: u32) -> &mut Self {
        self.pinned = Some(Provenance {
            log_index,
            ..event.provenance
        });
        self
    }

    /// Give the next event exactly `provenance`.
    pub fn with_provenance(&mut self, provenance: Provenance) -> &mut Self {
        self.pinned = Some(provenance);
        self
    }

    /// Ledger initialization.
    pub fn initialized(&mut self, staking_token: Address, initial_reward_rate: u64) -> LedgerEvent {
        let provenance = self.next_provenance();
        LedgerEvent::new(
            provenance,
            StakingEvent::Initialized(StakingInitialized {
                staking_token,
                initial_reward_rate: U256::from(initial_reward_rate),
            }),
        )
    }

    /// Stake of `amount` by `user`.
    pub fn staked(
        &mut self,
        user: Address,
        amount: u64,
        new_total_staked: u64,
        current_reward_rate: u64,
    ) -> LedgerEvent {
        let provenance = self.next_provenance();
        LedgerEvent::new(
            provenance,
            StakingEvent::Staked(Staked {
                user,
                amount: U256::from(amount),
                timestamp: provenance.block_timestamp,
                new_total_staked: U256::from(new_total_staked),
                current_reward_rate: U256::from(current_reward_rate),
            }),
        )
    }

    /// Withdrawal of `amount` by `user`.
    pub fn withdrawn(
        &mut self,
        user: Address,
        amount: u64,
        new_total_staked: u64,
        current_reward_rate: u64,
        rewards_accrued: u64,
    ) -> LedgerEvent {
        let provenance = self.next_provenance();
        LedgerEvent::new(
            provenance,
            StakingEvent::Withdrawn(Withdrawn {
                user,
                amount: U256::from(amount),
                timestamp: provenance.block_timestamp,
                new_total_staked: U256::from(new_total_staked),
                current_reward_rate: U256::from(current_reward_rate),
                rewards_accrued: U256::from(rewards_accrued),
            }),
        )
    }

    /// Reward claim of `amount` by `user`.
    pub fn rewards_claimed(
        &mut self,
        user: Address,
        amount: u64,
        new_pending_rewards: u64,
        total_staked: u64,
    ) -> LedgerEvent {
        let provenance = self.next_provenance();
        LedgerEvent::new(
            provenance,
            StakingEvent::RewardsClaimed(RewardsClaimed {
                user,
                amount: U256::from(amount),
                timestamp: provenance.block_timestamp,
                new_pending_rewards: U256::from(new_pending_rewards),
                total_staked: U256::from(total_staked),
            }),
        )
    }

    /// Reward rate change.
    pub fn reward_rate_updated(&mut self, old_rate: u64, new_rate: u64, total_staked: u64) -> LedgerEvent {
        let provenance = self.next_provenance();
        LedgerEvent::new(
            provenance,
            StakingEvent::RewardRateUpdated(RewardRateUpdated {
                old_rate: U256::from(old_rate),
                new_rate: U256::from(new_rate),
                timestamp: provenance.block_timestamp,
                total_staked: U256::from(total_staked),
            }),
        )
    }

    /// Emergency withdrawal of `amount` by `user`, forfeiting `penalty`.
    pub fn emergency_withdrawn(
        &mut self,
        user: Address,
        amount: u64,
        penalty: u64,
        new_total_staked: u64,
    ) -> LedgerEvent {
        let provenance = self.next_provenance();
        LedgerEvent::new(
            provenance,
            StakingEvent::EmergencyWithdrawn(EmergencyWithdrawn {
                user,
                amount: U256::from(amount),
                penalty: U256::from(penalty),
                timestamp: provenance.block_timestamp,
                new_total_staked: U256::from(new_total_staked),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_is_fresh_per_event() {
        let mut events = EventFactory::new();
        let user = Address::repeat_byte(1);
        let first = events.staked(user, 1, 1, 1);
        let second = events.staked(user, 1, 2, 1);

        assert_ne!(first.provenance.record_id(), second.provenance.record_id());
        assert_eq!(second.provenance.block_number, first.provenance.block_number + 1);
        assert_eq!(
            second.provenance.block_timestamp,
            first.provenance.block_timestamp + BLOCK_TIME
        );
        assert!(first.validate().is_ok());
    }

    #[test]
    fn pinned_provenance_applies_once() {
        let mut events = EventFactory::new();
        let user = Address::repeat_byte(1);
        let first = events.staked(user, 1, 1, 1);
        let sibling = events.in_same_transaction(&first, 4).staked(user, 1, 2, 1);
        let next = events.staked(user, 1, 3, 1);

        assert_eq!(sibling.provenance.transaction_hash, first.provenance.transaction_hash);
        assert_eq!(sibling.provenance.log_index, 4);
        assert_ne!(next.provenance.transaction_hash, first.provenance.transaction_hash);
    }
}
