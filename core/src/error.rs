//! Error taxonomy for the indexer.
//!
//! Two classes matter to callers:
//!
//! - **Fatal** errors ([`IndexerError::Storage`], [`IndexerError::Serialization`],
//!   [`IndexerError::Checkpoint`], [`IndexerError::Source`]): the current event
//!   must not be considered processed. Redelivery is the event source's job.
//! - **Rejections** ([`IndexerError::MalformedEvent`]): the event was refused
//!   before any state was touched.

use thiserror::Error;

/// Error type for indexer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexerError {
    /// The entity store could not load or persist a record.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An entity could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The incoming event is missing data or carries an inconsistent provenance key.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Checkpoint load or save failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// The event source failed to deliver.
    #[error("Event source error: {0}")]
    Source(String),
}

impl IndexerError {
    /// Whether this error aborts processing of the current event.
    ///
    /// Everything except [`IndexerError::MalformedEvent`] is fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::MalformedEvent(_))
    }

    /// Stable label for metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::MalformedEvent(_) => "malformed",
            Self::Checkpoint(_) => "checkpoint",
            Self::Source(_) => "source",
        }
    }
}

/// Result type for indexer operations.
pub type Result<T> = std::result::Result<T, IndexerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_is_the_only_non_fatal_error() {
        assert!(!IndexerError::MalformedEvent("x".into()).is_fatal());
        assert!(IndexerError::Storage("x".into()).is_fatal());
        assert!(IndexerError::Serialization("x".into()).is_fatal());
        assert!(IndexerError::Checkpoint("x".into()).is_fatal());
        assert!(IndexerError::Source("x".into()).is_fatal());
    }

    #[test]
    fn display_includes_context() {
        let err = IndexerError::Storage("connection reset".into());
        assert_eq!(err.to_string(), "Storage error: connection reset");
        assert_eq!(err.label(), "storage");
    }
}
