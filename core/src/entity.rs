//! Materialized entities: the two aggregates and the historical records.
//!
//! | Entity | Key | Lifecycle |
//! |---|---|---|
//! | [`GlobalAggregate`] | `"global"` | created on first access, mutated forever |
//! | [`ParticipantAggregate`] | participant address | created on first sight, mutated forever |
//! | [`EventRecord`] variants | [`RecordId`] | written once, never mutated |

use crate::event::Provenance;
use alloy_primitives::{Address, B256, U256, hex};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// Key of the singleton [`GlobalAggregate`].
pub const GLOBAL_ID: &str = "global";

/// Storage namespace for an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// [`GlobalAggregate`]
    Global,
    /// [`ParticipantAggregate`]
    Participant,
    /// [`StakeRecord`]
    Stake,
    /// [`WithdrawRecord`]
    Withdraw,
    /// [`ClaimRecord`]
    Claim,
    /// [`RateUpdateRecord`]
    RateUpdate,
    /// [`EmergencyWithdrawRecord`]
    EmergencyWithdraw,
}

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Global,
        Self::Participant,
        Self::Stake,
        Self::Withdraw,
        Self::Claim,
        Self::RateUpdate,
        Self::EmergencyWithdraw,
    ];

    /// Stable label persisted alongside each record.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global_state",
            Self::Participant => "participant",
            Self::Stake => "stake",
            Self::Withdraw => "withdraw",
            Self::Claim => "claim",
            Self::RateUpdate => "rate_update",
            Self::EmergencyWithdraw => "emergency_withdraw",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed record that lives in the entity store.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Namespace this entity is stored under.
    const KIND: EntityKind;

    /// Key within [`Entity::KIND`].
    fn key(&self) -> String;
}

/// Store key for a participant.
#[must_use]
pub fn participant_key(address: &Address) -> String {
    hex::encode_prefixed(address.as_slice())
}

/// Deterministic identifier of a historical record.
///
/// The transaction hash followed by the log index as four little-endian bytes
/// of a signed 32-bit integer, hex encoded. A transaction never emits two logs
/// at the same index, so the id is unique across the ledger's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Build the id for the log at `log_index` in `transaction_hash`.
    ///
    /// Callers validate that `log_index` fits in an `i32` first; larger
    /// values keep their low four bytes.
    #[must_use]
    pub fn new(transaction_hash: B256, log_index: u32) -> Self {
        let mut bytes = Vec::with_capacity(36);
        bytes.extend_from_slice(transaction_hash.as_slice());
        bytes.extend_from_slice(&log_index.to_le_bytes());
        Self(hex::encode_prefixed(bytes))
    }

    /// The hex form used as the store key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger-wide summary.
///
/// `total_staked` and `current_reward_rate` mirror whatever the latest event
/// reported. The `cumulative_*` counters and `total_unique_participants` are
/// summed locally and only ever grow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalAggregate {
    /// Staked total reported by the most recent event that carries one.
    pub total_staked: U256,
    /// Latest known reward rate.
    pub current_reward_rate: U256,
    /// Block time of the most recent event processed.
    pub last_update_timestamp: u64,
    /// Distinct participants ever seen.
    pub total_unique_participants: u64,
    /// Sum of every stake amount ever deposited.
    pub cumulative_staked: U256,
    /// Sum of every reward amount ever claimed.
    pub cumulative_rewards_distributed: U256,
    /// Staked asset, set at initialization.
    pub staking_token: Option<Address>,
    /// Participant most recently added to `total_unique_participants`.
    ///
    /// Registering the same participant twice in a row is a no-op, so a
    /// redelivered first event cannot count its participant again.
    #[serde(default)]
    pub last_registered: Option<Address>,
}

impl Entity for GlobalAggregate {
    const KIND: EntityKind = EntityKind::Global;

    fn key(&self) -> String {
        GLOBAL_ID.to_string()
    }
}

/// Per-participant summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantAggregate {
    /// Participant address.
    pub id: Address,
    /// Outstanding staked balance.
    pub staked_amount: U256,
    /// Rewards accrued but not yet claimed.
    pub pending_rewards: U256,
    /// Lifetime deposits.
    pub total_staked: U256,
    /// Lifetime withdrawals, emergency ones included.
    pub total_withdrawn: U256,
    /// Lifetime claimed rewards.
    pub total_rewards_claimed: U256,
    /// Ledger-reported time of the latest stake.
    pub last_stake_timestamp: u64,
    /// Block time of the latest event touching this participant.
    pub last_update_timestamp: u64,
    /// Record id of the latest event folded into this aggregate.
    #[serde(default)]
    pub last_applied: Option<RecordId>,
}

impl ParticipantAggregate {
    /// A zeroed aggregate for a participant seen for the first time.
    #[must_use]
    pub const fn new(id: Address) -> Self {
        Self {
            id,
            staked_amount: U256::ZERO,
            pending_rewards: U256::ZERO,
            total_staked: U256::ZERO,
            total_withdrawn: U256::ZERO,
            total_rewards_claimed: U256::ZERO,
            last_stake_timestamp: 0,
            last_update_timestamp: 0,
            last_applied: None,
        }
    }
}

impl Entity for ParticipantAggregate {
    const KIND: EntityKind = EntityKind::Participant;

    fn key(&self) -> String {
        participant_key(&self.id)
    }
}

/// Historical record of a stake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    /// Record key.
    pub id: RecordId,
    /// Participant that staked.
    pub user: Address,
    /// Amount deposited.
    pub amount: U256,
    /// Ledger-reported time.
    pub timestamp: u64,
    /// Ledger-wide staked total after the deposit.
    pub total_staked: U256,
    /// Ledger location.
    pub provenance: Provenance,
}

/// Historical record of a withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRecord {
    /// Record key.
    pub id: RecordId,
    /// Participant that withdrew.
    pub user: Address,
    /// Amount withdrawn.
    pub amount: U256,
    /// Ledger-reported time.
    pub timestamp: u64,
    /// Ledger-wide staked total after the withdrawal.
    pub total_staked: U256,
    /// Rewards accrued by the withdrawal.
    pub rewards_accrued: U256,
    /// Ledger location.
    pub provenance: Provenance,
}

/// Historical record of a reward claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Record key.
    pub id: RecordId,
    /// Participant that claimed.
    pub user: Address,
    /// Amount claimed.
    pub amount: U256,
    /// Ledger-reported time.
    pub timestamp: u64,
    /// Pending rewards left after the claim.
    pub new_pending_rewards: U256,
    /// Ledger location.
    pub provenance: Provenance,
}

/// Historical record of a reward-rate change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateUpdateRecord {
    /// Record key.
    pub id: RecordId,
    /// Rate before the change.
    pub old_rate: U256,
    /// Rate after the change.
    pub new_rate: U256,
    /// Ledger-reported time.
    pub timestamp: u64,
    /// Ledger location.
    pub provenance: Provenance,
}

/// Historical record of an emergency withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawRecord {
    /// Record key.
    pub id: RecordId,
    /// Participant that withdrew.
    pub user: Address,
    /// Amount returned.
    pub amount: U256,
    /// Penalty retained.
    pub penalty: U256,
    /// Ledger-reported time.
    pub timestamp: u64,
    /// Ledger-wide staked total after the withdrawal.
    pub total_staked: U256,
    /// Ledger location.
    pub provenance: Provenance,
}

macro_rules! record_entity {
    ($ty:ty, $kind:expr) => {
        impl Entity for $ty {
            const KIND: EntityKind = $kind;

            fn key(&self) -> String {
                self.id.as_str().to_string()
            }
        }
    };
}

record_entity!(StakeRecord, EntityKind::Stake);
record_entity!(WithdrawRecord, EntityKind::Withdraw);
record_entity!(ClaimRecord, EntityKind::Claim);
record_entity!(RateUpdateRecord, EntityKind::RateUpdate);
record_entity!(EmergencyWithdrawRecord, EntityKind::EmergencyWithdraw);

/// Any historical record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventRecord {
    /// A stake.
    Stake(StakeRecord),
    /// A withdrawal.
    Withdraw(WithdrawRecord),
    /// A reward claim.
    Claim(ClaimRecord),
    /// A reward-rate change.
    RateUpdate(RateUpdateRecord),
    /// An emergency withdrawal.
    EmergencyWithdraw(EmergencyWithdrawRecord),
}

impl EventRecord {
    /// Storage namespace of the wrapped record.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Stake(_) => EntityKind::Stake,
            Self::Withdraw(_) => EntityKind::Withdraw,
            Self::Claim(_) => EntityKind::Claim,
            Self::RateUpdate(_) => EntityKind::RateUpdate,
            Self::EmergencyWithdraw(_) => EntityKind::EmergencyWithdraw,
        }
    }

    /// Record key.
    #[must_use]
    pub const fn id(&self) -> &RecordId {
        match self {
            Self::Stake(r) => &r.id,
            Self::Withdraw(r) => &r.id,
            Self::Claim(r) => &r.id,
            Self::RateUpdate(r) => &r.id,
            Self::EmergencyWithdraw(r) => &r.id,
        }
    }

    /// Participant the record references, if any.
    #[must_use]
    pub const fn participant(&self) -> Option<Address> {
        match self {
            Self::Stake(r) => Some(r.user),
            Self::Withdraw(r) => Some(r.user),
            Self::Claim(r) => Some(r.user),
            Self::EmergencyWithdraw(r) => Some(r.user),
            Self::RateUpdate(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_appends_little_endian_index() {
        let id = RecordId::new(B256::repeat_byte(0xaa), 1);
        let expected = format!("0x{}01000000", "aa".repeat(32));
        assert_eq!(id.as_str(), expected);
    }

    #[test]
    fn record_ids_differ_by_index_and_transaction() {
        let tx_a = B256::repeat_byte(0x01);
        let tx_b = B256::repeat_byte(0x02);
        assert_ne!(RecordId::new(tx_a, 0), RecordId::new(tx_a, 1));
        assert_ne!(RecordId::new(tx_a, 0), RecordId::new(tx_b, 0));
        assert_eq!(RecordId::new(tx_a, 5), RecordId::new(tx_a, 5));
    }

    #[test]
    fn participant_key_is_lowercase_prefixed_hex() {
        let key = participant_key(&Address::repeat_byte(0xAB));
        assert_eq!(key, format!("0x{}", "ab".repeat(20)));
    }

    #[test]
    fn global_defaults_to_zero() {
        let global = GlobalAggregate::default();
        assert_eq!(global.total_staked, U256::ZERO);
        assert_eq!(global.total_unique_participants, 0);
        assert_eq!(global.staking_token, None);
        assert_eq!(global.key(), GLOBAL_ID);
    }

    #[test]
    fn entity_kind_labels_are_distinct() {
        let mut labels: Vec<_> = EntityKind::ALL.iter().map(|k| k.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), EntityKind::ALL.len());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn participant_aggregate_survives_json() {
        let mut participant = ParticipantAggregate::new(Address::repeat_byte(3));
        participant.staked_amount = U256::from(1_000_000_000_000_000_000_u128);
        let json = serde_json::to_vec(&participant).unwrap();
        let back: ParticipantAggregate = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, participant);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn aggregates_stored_without_markers_still_decode() {
        let mut participant =
            serde_json::to_value(ParticipantAggregate::new(Address::repeat_byte(3))).unwrap();
        participant.as_object_mut().unwrap().remove("last_applied");
        let back: ParticipantAggregate = serde_json::from_value(participant).unwrap();
        assert_eq!(back.last_applied, None);

        let mut global = serde_json::to_value(GlobalAggregate::default()).unwrap();
        global.as_object_mut().unwrap().remove("last_registered");
        let back: GlobalAggregate = serde_json::from_value(global).unwrap();
        assert_eq!(back, GlobalAggregate::default());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Distinct (transaction, index) pairs never share a record id.
            #[test]
            fn prop_record_ids_are_injective(
                tx_a in any::<[u8; 32]>(),
                tx_b in any::<[u8; 32]>(),
                index_a in 0_u32..=0x7fff_ffff,
                index_b in 0_u32..=0x7fff_ffff,
            ) {
                let a = RecordId::new(B256::from(tx_a), index_a);
                let b = RecordId::new(B256::from(tx_b), index_b);
                prop_assert_eq!(a == b, tx_a == tx_b && index_a == index_b);
            }
        }
    }
}
