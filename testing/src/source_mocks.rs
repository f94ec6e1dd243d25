//! In-memory event source.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use staking_indexer_core::{
    EventPosition, EventSource, EventStream, LedgerEvent, SerializedEvent, SourceError,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// Scripted event source for driving an `IndexerStream` in tests.
///
/// Items are delivered in push order. A subscription with `resume_after`
/// skips the first `events_processed` items, treating the count as an offset.
///
/// By default the stream ends after the last item. [`held_open`](Self::held_open)
/// keeps it pending instead, the way a live source waits for new blocks.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventSource {
    items: Arc<RwLock<Vec<Result<SerializedEvent, SourceError>>>>,
    subscriptions: Arc<RwLock<Vec<Option<EventPosition>>>>,
    held_open: bool,
    refuse_subscriptions: bool,
}

impl InMemoryEventSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that delivers `events` and then ends.
    #[must_use]
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Self {
        let source = Self::new();
        for event in events {
            source.push(event);
        }
        source
    }

    /// Keep the stream pending after the scripted items.
    #[must_use]
    pub const fn held_open(mut self) -> Self {
        self.held_open = true;
        self
    }

    /// Reject every subscription.
    #[must_use]
    pub const fn refusing_subscriptions(mut self) -> Self {
        self.refuse_subscriptions = true;
        self
    }

    /// Append an event, encoded as its envelope.
    pub fn push(&self, event: &LedgerEvent) {
        self.push_envelope(SerializedEvent::from_event(event, None).unwrap());
    }

    /// Append a raw envelope.
    pub fn push_envelope(&self, envelope: SerializedEvent) {
        self.items.write().unwrap().push(Ok(envelope));
    }

    /// Append a transport error.
    pub fn push_error(&self, error: SourceError) {
        self.items.write().unwrap().push(Err(error));
    }

    /// Positions passed to each `subscribe` call, in order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Option<EventPosition>> {
        self.subscriptions.read().unwrap().clone()
    }
}

impl EventSource for InMemoryEventSource {
    fn subscribe(
        &self,
        resume_after: Option<EventPosition>,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, SourceError>> + Send + '_>> {
        Box::pin(async move {
            self.subscriptions.write().unwrap().push(resume_after);
            if self.refuse_subscriptions {
                return Err(SourceError::SubscriptionFailed(
                    "source refuses subscriptions".to_string(),
                ));
            }

            let skip = resume_after.map_or(0, |pos| {
                usize::try_from(pos.events_processed).unwrap_or(usize::MAX)
            });
            let items: Vec<_> = self
                .items
                .read()
                .unwrap()
                .iter()
                .skip(skip)
                .cloned()
                .collect();
            let held_open = self.held_open;

            let stream = async_stream::stream! {
                for item in items {
                    yield item;
                }
                if held_open {
                    futures::future::pending::<()>().await;
                }
            };
            let stream: EventStream = Box::pin(stream);
            Ok(stream)
        })
    }
}
