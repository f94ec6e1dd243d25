//! Proptest strategies for ledger event sequences.

use proptest::prelude::*;
use staking_indexer_core::Address;

/// Small pool of participant addresses, so sequences revisit participants.
pub fn participant() -> impl Strategy<Value = Address> {
    (1_u8..=8).prop_map(Address::repeat_byte)
}

/// Token amounts that leave room for summing without saturation.
pub fn amount() -> impl Strategy<Value = u64> {
    0_u64..1_000_000_000
}

/// One step of a generated ledger history.
#[derive(Clone, Debug)]
pub enum LedgerOp {
    /// Stake `amount` by the participant.
    Stake(Address, u64),
    /// Withdraw `amount`, accruing `rewards`.
    Withdraw(Address, u64, u64),
    /// Claim `amount`.
    Claim(Address, u64),
    /// Change the reward rate.
    RateUpdate(u64),
    /// Emergency withdraw `amount`.
    EmergencyWithdraw(Address, u64),
}

impl LedgerOp {
    /// Participant touched by this step.
    #[must_use]
    pub const fn participant(&self) -> Option<Address> {
        match self {
            Self::Stake(user, _)
            | Self::Withdraw(user, _, _)
            | Self::Claim(user, _)
            | Self::EmergencyWithdraw(user, _) => Some(*user),
            Self::RateUpdate(_) => None,
        }
    }
}

/// Any single ledger step.
pub fn ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        3 => (participant(), amount()).prop_map(|(u, a)| LedgerOp::Stake(u, a)),
        2 => (participant(), amount(), amount()).prop_map(|(u, a, r)| LedgerOp::Withdraw(u, a, r)),
        2 => (participant(), amount()).prop_map(|(u, a)| LedgerOp::Claim(u, a)),
        1 => amount().prop_map(LedgerOp::RateUpdate),
        1 => (participant(), amount()).prop_map(|(u, a)| LedgerOp::EmergencyWithdraw(u, a)),
    ]
}

/// A ledger history of up to `max_len` steps.
pub fn ledger_history(max_len: usize) -> impl Strategy<Value = Vec<LedgerOp>> {
    prop::collection::vec(ledger_op(), 1..=max_len)
}
