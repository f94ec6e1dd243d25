//! Event source abstraction: the ordered delivery channel the indexer consumes.
//!
//! The source sits upstream of the indexer. It is responsible for chain access,
//! reorg handling, deduplication and ordering; the indexer assumes every
//! delivered event is new and in ledger order.
//!
//! ```text
//! ┌──────────────┐   SerializedEvent   ┌───────────────┐
//! │ Event Source │ ──────────────────▶ │ IndexerStream │ ──▶ EventDispatcher
//! └──────────────┘   (one at a time)   └───────────────┘
//!        ▲                                     │
//!        └──────── resume_after ◀── Checkpoint ┘
//! ```

use crate::event::SerializedEvent;
use crate::store::EventPosition;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by an event source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Failed to connect to the upstream ledger or broker.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to open a subscription.
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    /// Transport error while streaming.
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of delivered events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SerializedEvent, SourceError>> + Send>>;

/// An ordered, deduplicated source of ledger events.
///
/// Uses boxed futures so it can be shared as `Arc<dyn EventSource>`.
pub trait EventSource: Send + Sync {
    /// Open a stream of events.
    ///
    /// With `resume_after` set, the source starts with the first event after
    /// that position; with `None` it starts from the beginning of the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::SubscriptionFailed`] if the stream cannot be opened.
    fn subscribe(
        &self,
        resume_after: Option<EventPosition>,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, SourceError>> + Send + '_>>;
}
