//! `IndexerStream` behavior: checkpoints, resumption, rejection and shutdown.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use staking_indexer_core::{
    Address, EntityKind, EntityStore, EventPosition, IndexerError, SerializedEvent, SourceError,
    U256, Utc,
};
use staking_indexer_projections::{EventDispatcher, IndexerStream, StopReason};
use staking_indexer_testing::{
    EventFactory, FailingEntityStore, InMemoryCheckpoint, InMemoryEntityStore,
    InMemoryEventSource, init_test_tracing,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const NAME: &str = "staking-indexer";
const USER: Address = Address::repeat_byte(0x12);

fn runner<S: EntityStore>(
    store: &Arc<S>,
    source: &InMemoryEventSource,
    checkpoint: &InMemoryCheckpoint,
) -> (IndexerStream<S>, watch::Sender<bool>) {
    IndexerStream::new(
        EventDispatcher::new(Arc::clone(store)),
        Arc::new(source.clone()),
        Arc::new(checkpoint.clone()),
        NAME,
    )
}

fn stakes(events: &mut EventFactory, n: u64) -> Vec<staking_indexer_core::LedgerEvent> {
    (1..=n).map(|i| events.staked(USER, 10, 10 * i, 1)).collect()
}

#[tokio::test]
async fn runs_to_stream_end_and_checkpoints() {
    init_test_tracing();
    let store = Arc::new(InMemoryEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    let mut events = EventFactory::new();
    let history = stakes(&mut events, 3);
    let source = InMemoryEventSource::from_events(&history);

    let (mut stream, _shutdown) = runner(&store, &source, &checkpoint);
    let summary = stream.run().await.unwrap();

    assert_eq!(summary.stop, StopReason::StreamEnded);
    assert_eq!(summary.events_applied, 3);
    assert_eq!(summary.events_rejected, 0);

    let position = checkpoint.position(NAME).unwrap();
    assert_eq!(Some(position), summary.position);
    assert_eq!(position.events_processed, 3);
    assert_eq!(position.block_number, history[2].provenance.block_number);
    assert_eq!(checkpoint.save_count(), 1);
    assert_eq!(source.subscriptions(), vec![None]);
    assert_eq!(store.count(EntityKind::Stake), 3);
}

#[tokio::test]
async fn saves_every_interval() {
    let store = Arc::new(InMemoryEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    let mut events = EventFactory::new();
    let source = InMemoryEventSource::from_events(&stakes(&mut events, 5));

    let (stream, _shutdown) = runner(&store, &source, &checkpoint);
    let mut stream = stream.with_checkpoint_interval(2);
    stream.run().await.unwrap();

    let saved: Vec<u64> = checkpoint
        .history()
        .iter()
        .map(|(_, pos)| pos.events_processed)
        .collect();
    assert_eq!(saved, vec![2, 4, 5]);
}

#[tokio::test]
async fn resumes_after_saved_position() {
    let store = Arc::new(InMemoryEntityStore::new());
    let mut events = EventFactory::new();
    let history = stakes(&mut events, 4);
    let source = InMemoryEventSource::from_events(&history);
    let seeded = EventPosition::new(
        2,
        history[1].provenance.block_number,
        history[1].provenance.log_index,
        Utc::now(),
    );
    let checkpoint = InMemoryCheckpoint::starting_at(NAME, seeded);

    let (mut stream, _shutdown) = runner(&store, &source, &checkpoint);
    let summary = stream.run().await.unwrap();

    assert_eq!(source.subscriptions(), vec![Some(seeded)]);
    assert_eq!(summary.events_applied, 2);
    assert_eq!(checkpoint.position(NAME).unwrap().events_processed, 4);
    assert_eq!(store.count(EntityKind::Stake), 2);
}

#[tokio::test]
async fn skips_malformed_envelopes() {
    let store = Arc::new(InMemoryEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    let mut events = EventFactory::new();
    let source = InMemoryEventSource::new();

    let stake = events.staked(USER, 10, 10, 1);
    let mut mislabeled = SerializedEvent::from_event(&events.staked(USER, 5, 15, 1), None).unwrap();
    mislabeled.event_type = "Withdrawn.v1".to_string();

    source.push(&stake);
    source.push_envelope(SerializedEvent::new("Staked.v1".to_string(), vec![1, 2, 3], None));
    source.push_envelope(mislabeled);
    source.push(&events.withdrawn(Address::ZERO, 1, 9, 1, 0));
    source.push(&events.staked(USER, 20, 30, 1));

    let (mut stream, _shutdown) = runner(&store, &source, &checkpoint);
    let summary = stream.run().await.unwrap();

    assert_eq!(summary.events_applied, 2);
    assert_eq!(summary.events_rejected, 3);
    assert_eq!(checkpoint.position(NAME).unwrap().events_processed, 5);

    let participant: staking_indexer_core::ParticipantAggregate = store
        .get_entity(&staking_indexer_core::participant_key(&USER))
        .unwrap();
    assert_eq!(participant.staked_amount, U256::from(30));
}

#[tokio::test]
async fn storage_failure_stops_at_last_good_position() {
    let store = Arc::new(FailingEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    let mut events = EventFactory::new();
    let first = events.staked(USER, 10, 10, 1);
    let source = InMemoryEventSource::from_events(&[
        first.clone(),
        events.rewards_claimed(USER, 1, 0, 10),
        events.staked(USER, 10, 20, 1),
    ]);
    store.fail_writes_to(EntityKind::Claim);

    let (mut stream, _shutdown) = runner(&store, &source, &checkpoint);
    let err = stream.run().await.unwrap_err();

    assert!(matches!(err, IndexerError::Storage(_)));
    let position = checkpoint.position(NAME).unwrap();
    assert_eq!(position.events_processed, 1);
    assert_eq!(position.block_number, first.provenance.block_number);
    assert_eq!(store.inner().count(EntityKind::Stake), 1);
}

#[tokio::test]
async fn transport_error_is_returned() {
    let store = Arc::new(InMemoryEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    let mut events = EventFactory::new();
    let source = InMemoryEventSource::new();
    source.push(&events.staked(USER, 10, 10, 1));
    source.push_error(SourceError::TransportError("connection reset".to_string()));
    source.push(&events.staked(USER, 10, 20, 1));

    let (mut stream, _shutdown) = runner(&store, &source, &checkpoint);
    let err = stream.run().await.unwrap_err();

    assert!(matches!(err, IndexerError::Source(ref msg) if msg.contains("connection reset")));
    assert_eq!(checkpoint.position(NAME).unwrap().events_processed, 1);
    assert_eq!(store.count(EntityKind::Stake), 1);
}

#[tokio::test]
async fn refused_subscription_is_source_error() {
    let store = Arc::new(InMemoryEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    let source = InMemoryEventSource::new().refusing_subscriptions();

    let (mut stream, _shutdown) = runner(&store, &source, &checkpoint);
    let err = stream.run().await.unwrap_err();

    assert!(matches!(err, IndexerError::Source(_)));
    assert_eq!(checkpoint.save_count(), 0);
}

#[tokio::test]
async fn checkpoint_failure_is_fatal() {
    let store = Arc::new(InMemoryEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    checkpoint.set_fail_saves(true);
    let mut events = EventFactory::new();
    let source = InMemoryEventSource::from_events(&stakes(&mut events, 2));

    let (stream, _shutdown) = runner(&store, &source, &checkpoint);
    let mut stream = stream.with_checkpoint_interval(1);
    let err = stream.run().await.unwrap_err();

    assert!(matches!(err, IndexerError::Checkpoint(_)));
    assert_eq!(store.count(EntityKind::Stake), 1);
}

#[tokio::test]
async fn shutdown_stops_a_live_stream() {
    let store = Arc::new(InMemoryEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    let mut events = EventFactory::new();
    let source = InMemoryEventSource::from_events(&stakes(&mut events, 3)).held_open();

    let (mut stream, shutdown) = runner(&store, &source, &checkpoint);
    let handle = tokio::spawn(async move { stream.run().await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.count(EntityKind::Stake) < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("events should be applied");
    shutdown.send(true).unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("runner should stop")
        .unwrap()
        .unwrap();
    assert_eq!(summary.stop, StopReason::Shutdown);
    assert_eq!(summary.events_applied, 3);
    assert_eq!(checkpoint.position(NAME).unwrap().events_processed, 3);
}

#[tokio::test]
async fn shutdown_before_start_processes_nothing() {
    let store = Arc::new(InMemoryEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    let mut events = EventFactory::new();
    let source = InMemoryEventSource::from_events(&stakes(&mut events, 3));

    let (mut stream, shutdown) = runner(&store, &source, &checkpoint);
    shutdown.send(true).unwrap();
    let summary = stream.run().await.unwrap();

    assert_eq!(summary.stop, StopReason::Shutdown);
    assert_eq!(summary.events_applied, 0);
    assert!(store.is_empty());
    assert_eq!(checkpoint.save_count(), 0);
}

#[tokio::test]
async fn dropped_shutdown_sender_does_not_stop_the_stream() {
    let store = Arc::new(InMemoryEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    let mut events = EventFactory::new();
    let source = InMemoryEventSource::from_events(&stakes(&mut events, 2));

    let (mut stream, shutdown) = runner(&store, &source, &checkpoint);
    drop(shutdown);
    let summary = stream.run().await.unwrap();

    assert_eq!(summary.stop, StopReason::StreamEnded);
    assert_eq!(summary.events_applied, 2);
}

#[tokio::test]
async fn skipped_events_count_toward_the_interval() {
    let store = Arc::new(InMemoryEntityStore::new());
    let checkpoint = InMemoryCheckpoint::new();
    let mut events = EventFactory::new();
    let source = InMemoryEventSource::new();
    source.push(&events.staked(USER, 10, 10, 1));
    source.push_envelope(SerializedEvent::new("Staked.v1".to_string(), vec![0xff], None));
    source.push(&events.withdrawn(Address::ZERO, 1, 9, 1, 0));
    source.push(&events.staked(USER, 10, 20, 1));

    let (stream, _shutdown) = runner(&store, &source, &checkpoint);
    let mut stream = stream.with_checkpoint_interval(2);
    let summary = stream.run().await.unwrap();

    let saved: Vec<u64> = checkpoint
        .history()
        .iter()
        .map(|(_, pos)| pos.events_processed)
        .collect();
    assert_eq!(saved, vec![2, 4]);
    assert_eq!(summary.events_applied, 2);
    assert_eq!(summary.events_rejected, 2);
}

#[tokio::test]
async fn load_failure_stops_without_advancing_checkpoint() {
    let store = Arc::new(FailingEntityStore::new());
    let mut events = EventFactory::new();
    let history = stakes(&mut events, 3);
    let source = InMemoryEventSource::from_events(&history);
    let seeded = EventPosition::new(
        1,
        history[0].provenance.block_number,
        history[0].provenance.log_index,
        Utc::now(),
    );
    let checkpoint = InMemoryCheckpoint::starting_at(NAME, seeded);
    store.set_fail_loads(true);

    let (mut stream, _shutdown) = runner(&store, &source, &checkpoint);
    let err = stream.run().await.unwrap_err();

    assert!(matches!(err, IndexerError::Storage(_)));
    assert_eq!(checkpoint.position(NAME), Some(seeded));
    assert_eq!(checkpoint.save_count(), 0);
    assert!(store.inner().is_empty());
}
