//! Ledger events and their transport envelope.
//!
//! Events arrive already decoded and ordered by the upstream source. Each one
//! is a [`LedgerEvent`]: the event payload ([`StakingEvent`]) plus the
//! [`Provenance`] that locates it on the ledger.
//!
//! # Serialization
//!
//! On the wire, events travel as [`SerializedEvent`] envelopes whose `data` is
//! the bincode encoding of a [`LedgerEvent`]. The envelope's `event_type`
//! carries a versioned name (`"Staked.v1"`) so consumers can route without
//! decoding.
//!
//! # Example
//!
//! ```
//! use staking_indexer_core::event::{Event, LedgerEvent, Provenance, Staked, StakingEvent};
//! use alloy_primitives::{Address, B256, U256};
//!
//! let event = LedgerEvent::new(
//!     Provenance::new(B256::repeat_byte(0xab), 0, 100, 1_634_567_890),
//!     StakingEvent::Staked(Staked {
//!         user: Address::repeat_byte(0x12),
//!         amount: U256::from(1000),
//!         timestamp: 1_634_567_890,
//!         new_total_staked: U256::from(5000),
//!         current_reward_rate: U256::from(100),
//!     }),
//! );
//!
//! assert_eq!(event.event_type(), "Staked.v1");
//! assert!(event.validate().is_ok());
//! ```

use crate::entity::RecordId;
use crate::error::{IndexerError, Result};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// An event that can be carried in a [`SerializedEvent`] envelope.
pub trait Event: Send + Sync + 'static {
    /// Stable, versioned type identifier (e.g. `"Staked.v1"`).
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Serialization`] if the event cannot be encoded.
    fn to_bytes(&self) -> Result<Vec<u8>>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| IndexerError::Serialization(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::MalformedEvent`] if the bytes do not decode
    /// into this event type.
    fn from_bytes(bytes: &[u8]) -> Result<Self>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| IndexerError::MalformedEvent(e.to_string()))
    }
}

/// Where an event came from on the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// Hash of the originating transaction.
    pub transaction_hash: B256,
    /// Position of the event within its transaction's logs.
    pub log_index: u32,
    /// Block that included the transaction.
    pub block_number: u64,
    /// Block time in seconds since the Unix epoch.
    pub block_timestamp: u64,
}

impl Provenance {
    /// Create a new provenance value.
    #[must_use]
    pub const fn new(
        transaction_hash: B256,
        log_index: u32,
        block_number: u64,
        block_timestamp: u64,
    ) -> Self {
        Self {
            transaction_hash,
            log_index,
            block_number,
            block_timestamp,
        }
    }

    /// Deterministic historical record key for this event.
    #[must_use]
    pub fn record_id(&self) -> RecordId {
        RecordId::new(self.transaction_hash, self.log_index)
    }

    fn validate(&self) -> Result<()> {
        if self.transaction_hash == B256::ZERO {
            return Err(IndexerError::MalformedEvent(
                "transaction hash is zero".to_string(),
            ));
        }
        if i32::try_from(self.log_index).is_err() {
            return Err(IndexerError::MalformedEvent(format!(
                "log index {} exceeds i32::MAX",
                self.log_index
            )));
        }
        Ok(())
    }
}

/// The staking ledger was initialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingInitialized {
    /// Asset being staked.
    pub staking_token: Address,
    /// Reward rate at launch.
    pub initial_reward_rate: U256,
}

/// A participant deposited stake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staked {
    /// Participant address.
    pub user: Address,
    /// Amount deposited.
    pub amount: U256,
    /// Ledger-reported time of the stake.
    pub timestamp: u64,
    /// Ledger-wide staked total after this deposit.
    pub new_total_staked: U256,
    /// Reward rate in force after this deposit.
    pub current_reward_rate: U256,
}

/// A participant withdrew stake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawn {
    /// Participant address.
    pub user: Address,
    /// Amount withdrawn.
    pub amount: U256,
    /// Ledger-reported time of the withdrawal.
    pub timestamp: u64,
    /// Ledger-wide staked total after this withdrawal.
    pub new_total_staked: U256,
    /// Reward rate in force after this withdrawal.
    pub current_reward_rate: U256,
    /// Rewards accrued to the participant by this withdrawal.
    pub rewards_accrued: U256,
}

/// A participant claimed rewards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsClaimed {
    /// Participant address.
    pub user: Address,
    /// Amount claimed.
    pub amount: U256,
    /// Ledger-reported time of the claim.
    pub timestamp: u64,
    /// Participant's pending rewards after the claim.
    pub new_pending_rewards: U256,
    /// Ledger-wide staked total at the time of the claim.
    pub total_staked: U256,
}

/// The reward rate changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRateUpdated {
    /// Rate before the change.
    pub old_rate: U256,
    /// Rate after the change.
    pub new_rate: U256,
    /// Ledger-reported time of the change.
    pub timestamp: u64,
    /// Ledger-wide staked total at the time of the change.
    pub total_staked: U256,
}

/// A participant withdrew everything, forfeiting a penalty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyWithdrawn {
    /// Participant address.
    pub user: Address,
    /// Amount returned to the participant.
    pub amount: U256,
    /// Penalty retained by the ledger.
    pub penalty: U256,
    /// Ledger-reported time of the withdrawal.
    pub timestamp: u64,
    /// Ledger-wide staked total after this withdrawal.
    pub new_total_staked: U256,
}

/// Every event kind the staking ledger emits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakingEvent {
    /// See [`StakingInitialized`].
    Initialized(StakingInitialized),
    /// See [`Staked`].
    Staked(Staked),
    /// See [`Withdrawn`].
    Withdrawn(Withdrawn),
    /// See [`RewardsClaimed`].
    RewardsClaimed(RewardsClaimed),
    /// See [`RewardRateUpdated`].
    RewardRateUpdated(RewardRateUpdated),
    /// See [`EmergencyWithdrawn`].
    EmergencyWithdrawn(EmergencyWithdrawn),
}

impl StakingEvent {
    /// Short kind label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Initialized(_) => "initialized",
            Self::Staked(_) => "staked",
            Self::Withdrawn(_) => "withdrawn",
            Self::RewardsClaimed(_) => "rewards_claimed",
            Self::RewardRateUpdated(_) => "reward_rate_updated",
            Self::EmergencyWithdrawn(_) => "emergency_withdrawn",
        }
    }

    /// The participant this event concerns, if any.
    #[must_use]
    pub const fn participant(&self) -> Option<Address> {
        match self {
            Self::Staked(e) => Some(e.user),
            Self::Withdrawn(e) => Some(e.user),
            Self::RewardsClaimed(e) => Some(e.user),
            Self::EmergencyWithdrawn(e) => Some(e.user),
            Self::Initialized(_) | Self::RewardRateUpdated(_) => None,
        }
    }
}

/// One decoded event as delivered by the event source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Ledger location of the event.
    pub provenance: Provenance,
    /// Event payload.
    pub event: StakingEvent,
}

impl LedgerEvent {
    /// Create a new ledger event.
    #[must_use]
    pub const fn new(provenance: Provenance, event: StakingEvent) -> Self {
        Self { provenance, event }
    }

    /// Check that the event can be applied without touching any state.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::MalformedEvent`] if the provenance key is
    /// unusable, a participant-bearing event names the zero address, or an
    /// initialization names no staking token.
    pub fn validate(&self) -> Result<()> {
        self.provenance.validate()?;

        if let Some(user) = self.event.participant() {
            if user == Address::ZERO {
                return Err(IndexerError::MalformedEvent(format!(
                    "{} event has zero participant address",
                    self.event.kind()
                )));
            }
        }

        if let StakingEvent::Initialized(init) = &self.event {
            if init.staking_token == Address::ZERO {
                return Err(IndexerError::MalformedEvent(
                    "initialization has zero staking token".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Decode a ledger event from its transport envelope.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::MalformedEvent`] if the payload does not decode
    /// or if the envelope's `event_type` disagrees with the decoded variant.
    pub fn from_envelope(envelope: &SerializedEvent) -> Result<Self> {
        let event = Self::from_bytes(&envelope.data)?;
        if event.event_type() != envelope.event_type {
            return Err(IndexerError::MalformedEvent(format!(
                "envelope type {} does not match payload type {}",
                envelope.event_type,
                event.event_type()
            )));
        }
        Ok(event)
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self.event {
            StakingEvent::Initialized(_) => "StakingInitialized.v1",
            StakingEvent::Staked(_) => "Staked.v1",
            StakingEvent::Withdrawn(_) => "Withdrawn.v1",
            StakingEvent::RewardsClaimed(_) => "RewardsClaimed.v1",
            StakingEvent::RewardRateUpdated(_) => "RewardRateUpdated.v1",
            StakingEvent::EmergencyWithdrawn(_) => "EmergencyWithdrawn.v1",
        }
    }
}

/// A serialized event ready for transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., `"Staked.v1"`).
    pub event_type: String,

    /// The bincode-serialized event data.
    pub data: Vec<u8>,

    /// Optional source metadata (e.g. chain id, subscription id).
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Create a serialized event from an [`Event`].
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Serialization`] if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}
