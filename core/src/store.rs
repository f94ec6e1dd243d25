//! Persistence contracts: the entity store and checkpoint tracking.
//!
//! # Entity Store
//!
//! [`EntityStore`] is a keyed byte store partitioned by [`EntityKind`]. It owns
//! durable storage and nothing else. The one guarantee the indexer relies on is
//! read-after-write visibility: anything stored while processing one event is
//! visible when the next event is processed.
//!
//! Typed access goes through [`EntityStoreExt`], which encodes entities as
//! JSON so the stored form stays inspectable from SQL.
//!
//! ```ignore
//! let store = PostgresEntityStore::new(pool);
//! store.store_entity(&participant).await?;
//! let loaded: Option<ParticipantAggregate> = store.load_entity(&key).await?;
//! ```
//!
//! # Checkpoints
//!
//! [`Checkpoint`] records how far the indexer has processed the event stream so
//! a restart resumes after the last persisted position instead of replaying
//! from genesis.

use crate::entity::{Entity, EntityKind};
use crate::error::{IndexerError, Result};
use crate::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Keyed storage backend for materialized entities.
///
/// `store` has upsert semantics. No multi-key transaction is assumed.
pub trait EntityStore: Send + Sync {
    /// Load the bytes stored under `(kind, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Storage`] if the backend cannot be read.
    fn load(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Insert or replace the bytes stored under `(kind, key)`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Storage`] if the write fails.
    fn store(
        &self,
        kind: EntityKind,
        key: &str,
        data: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Check whether anything is stored under `(kind, key)`.
    ///
    /// Default implementation uses [`EntityStore::load`].
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Storage`] if the check fails.
    fn exists(&self, kind: EntityKind, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.load(kind, key).await?.is_some()) }
    }
}

/// Typed helpers over any [`EntityStore`].
pub trait EntityStoreExt: EntityStore {
    /// Load and decode an entity.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Storage`] if the load fails, or
    /// [`IndexerError::Serialization`] if the stored bytes do not decode.
    fn load_entity<T: Entity>(&self, key: &str) -> impl Future<Output = Result<Option<T>>> + Send {
        async move {
            match self.load(T::KIND, key).await? {
                Some(bytes) => decode(&bytes).map(Some),
                None => Ok(None),
            }
        }
    }

    /// Encode and upsert an entity under its own key.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Serialization`] if encoding fails, or
    /// [`IndexerError::Storage`] if the write fails.
    fn store_entity<T: Entity>(&self, entity: &T) -> impl Future<Output = Result<()>> + Send {
        async move {
            let bytes = encode(entity)?;
            self.store(T::KIND, &entity.key(), &bytes).await
        }
    }
}

impl<S: EntityStore> EntityStoreExt for S {}

/// Encode an entity in its stored form.
///
/// # Errors
///
/// Returns [`IndexerError::Serialization`] if the entity cannot be encoded.
pub fn encode<T: Entity>(entity: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(entity).map_err(|e| {
        IndexerError::Serialization(format!("Failed to encode {}: {e}", T::KIND))
    })
}

/// Decode an entity from its stored form.
///
/// # Errors
///
/// Returns [`IndexerError::Serialization`] if the bytes are not a valid `T`.
pub fn decode<T: Entity>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        IndexerError::Serialization(format!("Failed to decode {}: {e}", T::KIND))
    })
}

/// Position in the event stream, persisted by a [`Checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPosition {
    /// Events fully processed so far (rejected ones included).
    pub events_processed: u64,
    /// Block of the last processed event.
    pub block_number: u64,
    /// Log index of the last processed event within its transaction.
    pub log_index: u32,
    /// Wall-clock time the position was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl EventPosition {
    /// Create a new event position.
    #[must_use]
    pub const fn new(
        events_processed: u64,
        block_number: u64,
        log_index: u32,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            events_processed,
            block_number,
            log_index,
            recorded_at,
        }
    }
}

/// Checkpoint tracking for indexer progress through the event stream.
///
/// Uses boxed futures so it can be shared as `Arc<dyn Checkpoint>`.
pub trait Checkpoint: Send + Sync {
    /// Save the current position for the named indexer.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Checkpoint`] if save fails.
    fn save_position(
        &self,
        name: &str,
        position: EventPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Load the last saved position, or `None` for a fresh indexer.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Checkpoint`] if load fails.
    fn load_position(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<EventPosition>>> + Send + '_>>;
}
