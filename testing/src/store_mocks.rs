//! In-memory storage doubles.
//!
//! - [`InMemoryEntityStore`]: `BTreeMap`-backed entity storage
//! - [`FailingEntityStore`]: wraps the in-memory store with fault injection
//! - [`InMemoryCheckpoint`]: in-memory checkpoint tracking

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use staking_indexer_core::store::decode;
use staking_indexer_core::{
    Checkpoint, Entity, EntityKind, EntityStore, EventPosition, IndexerError, Result,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

type Entries = BTreeMap<(EntityKind, String), Vec<u8>>;

/// In-memory entity store for fast, deterministic testing.
///
/// Clones share the same underlying map.
///
/// # Example
///
/// ```
/// use staking_indexer_testing::InMemoryEntityStore;
/// use staking_indexer_core::{EntityKind, EntityStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryEntityStore::new();
/// store.store(EntityKind::Global, "global", b"{}").await?;
/// assert!(store.contains(EntityKind::Global, "global"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEntityStore {
    data: Arc<RwLock<Entries>>,
}

impl InMemoryEntityStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored entities across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    /// Check if `(kind, key)` is stored.
    #[must_use]
    pub fn contains(&self, kind: EntityKind, key: &str) -> bool {
        self.data
            .read()
            .unwrap()
            .contains_key(&(kind, key.to_string()))
    }

    /// Number of stored entities of `kind`.
    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        self.data
            .read()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Keys stored under `kind`, in sorted order.
    #[must_use]
    pub fn keys(&self, kind: EntityKind) -> Vec<String> {
        self.data
            .read()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, key)| key.clone())
            .collect()
    }

    /// Raw stored bytes.
    #[must_use]
    pub fn get_raw(&self, kind: EntityKind, key: &str) -> Option<Vec<u8>> {
        self.data
            .read()
            .unwrap()
            .get(&(kind, key.to_string()))
            .cloned()
    }

    /// Decode a stored entity.
    ///
    /// # Panics
    ///
    /// Panics if the stored bytes are not a valid `T`.
    #[must_use]
    pub fn get_entity<T: Entity>(&self, key: &str) -> Option<T> {
        self.get_raw(T::KIND, key).map(|bytes| decode(&bytes).unwrap())
    }

    /// Every decoded entity of type `T`, in key order.
    #[must_use]
    pub fn entities<T: Entity>(&self) -> Vec<T> {
        self.keys(T::KIND)
            .iter()
            .filter_map(|key| self.get_entity(key))
            .collect()
    }

    /// Copy of the full contents, for before/after comparisons.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<(EntityKind, String), Vec<u8>> {
        self.data.read().unwrap().clone()
    }
}

impl EntityStore for InMemoryEntityStore {
    async fn load(&self, kind: EntityKind, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_raw(kind, key))
    }

    async fn store(&self, kind: EntityKind, key: &str, data: &[u8]) -> Result<()> {
        self.data
            .write()
            .unwrap()
            .insert((kind, key.to_string()), data.to_vec());
        Ok(())
    }

    async fn exists(&self, kind: EntityKind, key: &str) -> Result<bool> {
        Ok(self.contains(kind, key))
    }
}

/// Entity store with injectable storage failures.
///
/// Delegates to an [`InMemoryEntityStore`] until a configured fault triggers,
/// then returns [`IndexerError::Storage`].
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(FailingEntityStore::new());
/// store.fail_writes_to(EntityKind::Global);
/// let err = dispatcher.dispatch(&event).await.unwrap_err();
/// assert!(err.is_fatal());
/// ```
#[derive(Debug, Default)]
pub struct FailingEntityStore {
    inner: InMemoryEntityStore,
    writes: AtomicU64,
    write_budget: RwLock<Option<u64>>,
    failing_kinds: RwLock<HashSet<EntityKind>>,
    fail_loads: AtomicBool,
}

impl FailingEntityStore {
    /// Create a store that does not fail until told to.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The backing store, for assertions.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryEntityStore {
        &self.inner
    }

    /// Let the next `n` writes succeed, then fail every write.
    pub fn fail_writes_after(&self, n: u64) {
        *self.write_budget.write().unwrap() = Some(n);
    }

    /// Fail every write to `kind`.
    pub fn fail_writes_to(&self, kind: EntityKind) {
        self.failing_kinds.write().unwrap().insert(kind);
    }

    /// Fail or stop failing every load.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Clear all injected faults.
    pub fn heal(&self) {
        *self.write_budget.write().unwrap() = None;
        self.failing_kinds.write().unwrap().clear();
        self.fail_loads.store(false, Ordering::SeqCst);
    }

    /// Writes that reached the backing store.
    #[must_use]
    pub fn successful_writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self, kind: EntityKind, key: &str) -> Result<()> {
        if self.failing_kinds.read().unwrap().contains(&kind) {
            return Err(IndexerError::Storage(format!(
                "injected write failure for {kind} {key}"
            )));
        }
        let mut budget = self.write_budget.write().unwrap();
        if let Some(remaining) = budget.as_mut() {
            if *remaining == 0 {
                return Err(IndexerError::Storage(format!(
                    "injected write failure for {kind} {key}"
                )));
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

impl EntityStore for FailingEntityStore {
    async fn load(&self, kind: EntityKind, key: &str) -> Result<Option<Vec<u8>>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(IndexerError::Storage(format!(
                "injected load failure for {kind} {key}"
            )));
        }
        self.inner.load(kind, key).await
    }

    async fn store(&self, kind: EntityKind, key: &str, data: &[u8]) -> Result<()> {
        self.check_write(kind, key)?;
        self.inner.store(kind, key, data).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory checkpoint tracking for testing resumption.
///
/// Keeps every saved position so tests can assert on checkpoint cadence.
///
/// # Example
///
/// ```
/// use staking_indexer_testing::InMemoryCheckpoint;
/// use staking_indexer_core::{Checkpoint, EventPosition, Utc};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let checkpoint = InMemoryCheckpoint::new();
/// let position = EventPosition::new(42, 7, 0, Utc::now());
/// checkpoint.save_position("indexer", position).await?;
/// assert_eq!(checkpoint.load_position("indexer").await?, Some(position));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryCheckpoint {
    positions: Arc<RwLock<HashMap<String, EventPosition>>>,
    history: Arc<RwLock<Vec<(String, EventPosition)>>>,
    fail_saves: Arc<AtomicBool>,
}

impl InMemoryCheckpoint {
    /// Create a new empty checkpoint tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker pre-seeded with a saved position.
    #[must_use]
    pub fn starting_at(name: &str, position: EventPosition) -> Self {
        let checkpoint = Self::new();
        checkpoint
            .positions
            .write()
            .unwrap()
            .insert(name.to_string(), position);
        checkpoint
    }

    /// The current position for `name`.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<EventPosition> {
        self.positions.read().unwrap().get(name).copied()
    }

    /// Every save in order, seeded positions excluded.
    #[must_use]
    pub fn history(&self) -> Vec<(String, EventPosition)> {
        self.history.read().unwrap().clone()
    }

    /// Number of saves performed.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.history.read().unwrap().len()
    }

    /// Fail or stop failing every save.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl Checkpoint for InMemoryCheckpoint {
    fn save_position(
        &self,
        name: &str,
        position: EventPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(IndexerError::Checkpoint(
                    "injected checkpoint failure".to_string(),
                ));
            }
            self.positions
                .write()
                .unwrap()
                .insert(name.clone(), position);
            self.history.write().unwrap().push((name, position));
            Ok(())
        })
    }

    fn load_position(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<EventPosition>>> + Send + '_>> {
        let position = self.position(name);
        Box::pin(async move { Ok(position) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use staking_indexer_core::Utc;

    #[tokio::test]
    async fn in_memory_store_upserts() {
        let store = InMemoryEntityStore::new();
        store.store(EntityKind::Participant, "a", b"1").await.unwrap();
        store.store(EntityKind::Participant, "a", b"2").await.unwrap();
        store.store(EntityKind::Stake, "a", b"3").await.unwrap();

        assert_eq!(store.count(EntityKind::Participant), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.load(EntityKind::Participant, "a").await.unwrap(),
            Some(b"2".to_vec())
        );
        assert!(!store.exists(EntityKind::Claim, "a").await.unwrap());
    }

    #[tokio::test]
    async fn failing_store_honors_write_budget() {
        let store = FailingEntityStore::new();
        store.fail_writes_after(1);

        store.store(EntityKind::Global, "global", b"{}").await.unwrap();
        let err = store
            .store(EntityKind::Global, "global", b"{}")
            .await
            .unwrap_err();

        assert!(matches!(err, IndexerError::Storage(_)));
        assert_eq!(store.successful_writes(), 1);

        store.heal();
        store.store(EntityKind::Global, "global", b"{}").await.unwrap();
    }

    #[tokio::test]
    async fn failing_store_targets_one_kind() {
        let store = FailingEntityStore::new();
        store.fail_writes_to(EntityKind::Stake);

        store.store(EntityKind::Participant, "p", b"{}").await.unwrap();
        assert!(store.store(EntityKind::Stake, "s", b"{}").await.is_err());
        assert!(store.inner().contains(EntityKind::Participant, "p"));
        assert!(!store.inner().contains(EntityKind::Stake, "s"));
    }

    #[tokio::test]
    async fn checkpoint_records_history() {
        let checkpoint = InMemoryCheckpoint::new();
        let first = EventPosition::new(1, 10, 0, Utc::now());
        let second = EventPosition::new(2, 11, 3, Utc::now());

        checkpoint.save_position("a", first).await.unwrap();
        checkpoint.save_position("a", second).await.unwrap();

        assert_eq!(checkpoint.load_position("a").await.unwrap(), Some(second));
        assert_eq!(checkpoint.load_position("b").await.unwrap(), None);
        assert_eq!(checkpoint.save_count(), 2);
    }
}
