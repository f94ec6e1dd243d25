//! Stream runner: drives an [`EventDispatcher`] from an [`EventSource`].
//!
//! ```text
//! ┌──────────────┐
//! │ Event Source │ (ordered, deduplicated)
//! └──────┬───────┘
//!        │ SerializedEvent
//!        ▼
//! ┌───────────────┐      ┌────────────┐
//! │ IndexerStream │ ───▶ │ Checkpoint │
//! └──────┬────────┘      └────────────┘
//!        │ LedgerEvent (one at a time)
//!        ▼
//! ┌─────────────────┐
//! │ EventDispatcher │
//! └─────────────────┘
//! ```
//!
//! The runner resumes after the last saved [`EventPosition`], and saves a new one
//! every `checkpoint_interval` consumed events (skipped ones included), on clean
//! stream end, on shutdown, and before returning a fatal error (at the last good
//! position).
//!
//! Malformed events are logged, counted and skipped: they can never become
//! valid, so the checkpoint moves past them. Storage failures stop the runner
//! without advancing past the failed event.

use crate::dispatcher::EventDispatcher;
use metrics::counter;
use staking_indexer_core::{
    Checkpoint, EntityStore, EventPosition, EventSource, IndexerError, LedgerEvent, Result,
    SerializedEvent, Utc,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;

/// Default number of events between checkpoint saves.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100;

/// Why [`IndexerStream::run`] returned successfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The source closed its stream.
    StreamEnded,
    /// A shutdown signal was received.
    Shutdown,
}

/// Outcome of a completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Events applied during this run.
    pub events_applied: u64,
    /// Malformed events skipped during this run.
    pub events_rejected: u64,
    /// Last saved position, if any has ever been saved.
    pub position: Option<EventPosition>,
    /// Why the run ended.
    pub stop: StopReason,
}

#[derive(Default)]
struct Progress {
    events_processed: u64,
    block_number: u64,
    log_index: u32,
    since_checkpoint: u64,
    applied: u64,
    rejected: u64,
    saved: Option<EventPosition>,
}

impl Progress {
    fn resume(position: Option<EventPosition>) -> Self {
        position.map_or_else(Self::default, |pos| Self {
            events_processed: pos.events_processed,
            block_number: pos.block_number,
            log_index: pos.log_index,
            saved: Some(pos),
            ..Self::default()
        })
    }

    fn position(&self) -> EventPosition {
        EventPosition::new(
            self.events_processed,
            self.block_number,
            self.log_index,
            Utc::now(),
        )
    }
}

/// Feeds events from a source into a dispatcher, with checkpointing.
pub struct IndexerStream<S> {
    dispatcher: EventDispatcher<S>,
    source: Arc<dyn EventSource>,
    checkpoint: Arc<dyn Checkpoint>,
    name: String,
    checkpoint_interval: u64,
    shutdown: watch::Receiver<bool>,
}

impl<S: EntityStore> IndexerStream<S> {
    /// Create a runner.
    ///
    /// Returns the runner and a shutdown sender. Send `true` to stop the runner
    /// after the event in flight, if any, has been fully applied.
    ///
    /// `name` keys the checkpoint, so two runners over the same store must use
    /// different names.
    #[must_use]
    pub fn new(
        dispatcher: EventDispatcher<S>,
        source: Arc<dyn EventSource>,
        checkpoint: Arc<dyn Checkpoint>,
        name: impl Into<String>,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let stream = Self {
            dispatcher,
            source,
            checkpoint,
            name: name.into(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            shutdown: shutdown_rx,
        };

        (stream, shutdown_tx)
    }

    /// Set the checkpoint save interval (every N events, minimum 1).
    #[must_use]
    pub const fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = if interval == 0 { 1 } else { interval };
        self
    }

    /// Checkpoint key of this runner.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dispatcher this runner feeds.
    #[must_use]
    pub const fn dispatcher(&self) -> &EventDispatcher<S> {
        &self.dispatcher
    }

    /// Process events until the source ends or shutdown is signalled.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Checkpoint`] if the checkpoint cannot be loaded
    /// or saved, [`IndexerError::Source`] if the subscription or transport
    /// fails, or the storage-class error that stopped event processing.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let resume_after = self.checkpoint.load_position(&self.name).await?;
        match &resume_after {
            Some(pos) => tracing::info!(
                indexer = %self.name,
                events_processed = pos.events_processed,
                block_number = pos.block_number,
                log_index = pos.log_index,
                "Resuming from checkpoint"
            ),
            None => tracing::info!(indexer = %self.name, "Starting from beginning"),
        }

        let mut events = self
            .source
            .subscribe(resume_after)
            .await
            .map_err(|e| IndexerError::Source(format!("Failed to subscribe: {e}")))?;

        let mut progress = Progress::resume(resume_after);
        let mut shutdown_open = true;

        let stop = loop {
            if *self.shutdown.borrow() {
                break StopReason::Shutdown;
            }

            tokio::select! {
                biased;

                changed = self.shutdown.changed(), if shutdown_open => {
                    // A dropped sender can never signal again.
                    if changed.is_err() {
                        shutdown_open = false;
                    }
                }

                next = events.next() => match next {
                    None => break StopReason::StreamEnded,
                    Some(Ok(envelope)) => {
                        if let Err(e) = self.process(&envelope, &mut progress).await {
                            self.save_before_failure(&mut progress).await;
                            return Err(e);
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(indexer = %self.name, error = %e, "Event source failed");
                        self.save_before_failure(&mut progress).await;
                        return Err(IndexerError::Source(e.to_string()));
                    }
                },
            }
        };

        if progress.since_checkpoint > 0 {
            self.save(&mut progress).await?;
        }

        tracing::info!(
            indexer = %self.name,
            applied = progress.applied,
            rejected = progress.rejected,
            reason = ?stop,
            "Indexer stream stopped"
        );

        Ok(RunSummary {
            events_applied: progress.applied,
            events_rejected: progress.rejected,
            position: progress.saved,
            stop,
        })
    }

    async fn process(&mut self, envelope: &SerializedEvent, progress: &mut Progress) -> Result<()> {
        let decoded = LedgerEvent::from_envelope(envelope);

        let outcome = match &decoded {
            Ok(event) => self.dispatcher.dispatch(event).await,
            Err(e) => {
                counter!("staking_indexer_events_rejected_total", "reason" => e.label())
                    .increment(1);
                Err(e.clone())
            }
        };

        match outcome {
            Ok(()) => progress.applied += 1,
            Err(e) if !e.is_fatal() => {
                tracing::warn!(
                    indexer = %self.name,
                    event_type = %envelope.event_type,
                    error = %e,
                    "Skipping malformed event"
                );
                progress.rejected += 1;
            }
            Err(e) => return Err(e),
        }

        if let Ok(event) = &decoded {
            progress.block_number = event.provenance.block_number;
            progress.log_index = event.provenance.log_index;
        }
        progress.events_processed += 1;
        progress.since_checkpoint += 1;

        if progress.since_checkpoint >= self.checkpoint_interval {
            self.save(progress).await?;
        }
        Ok(())
    }

    async fn save(&self, progress: &mut Progress) -> Result<()> {
        let position = progress.position();
        self.checkpoint.save_position(&self.name, position).await?;
        progress.saved = Some(position);
        progress.since_checkpoint = 0;

        tracing::info!(
            indexer = %self.name,
            events_processed = position.events_processed,
            block_number = position.block_number,
            "Checkpoint saved"
        );
        Ok(())
    }

    async fn save_before_failure(&self, progress: &mut Progress) {
        if progress.since_checkpoint == 0 {
            return;
        }
        if let Err(e) = self.save(progress).await {
            tracing::error!(indexer = %self.name, error = %e, "Failed to save checkpoint");
        }
    }
}
