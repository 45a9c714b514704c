//! # alertdedup
//!
//! Streaming near-duplicate detection for alert and log event streams.
//!
//! Monitoring pipelines tend to report the same underlying condition many
//! times with slightly different wording. alertdedup classifies every event of
//! a time-ordered stream as either novel or a near-duplicate of a recent event,
//! using fuzzy text similarity over a bounded look-back window, and links each
//! duplicate to the root event that first reported the condition.
//!
//! ## Features
//!
//! - Indel-ratio fuzzy similarity on a 0-100 scale
//! - Time-bounded history window with mandatory eviction
//! - Deterministic classification with most-recent tie-breaking
//! - Duplicate chains flattened to a single root representative
//! - Independent windows per partition (host, tenant, source)
//! - CSV and NDJSON sources and sinks for batch runs
//!
//! ## Example
//!
//! ```rust
//! use alertdedup::services::deduplication::{DeduplicationConfig, StreamPipeline};
//! use alertdedup::models::Event;
//! use chrono::{TimeZone, Utc};
//!
//! let mut pipeline = StreamPipeline::new(DeduplicationConfig::default())?;
//!
//! let first = Event::new("1", Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(), "disk full on host1");
//! let second = Event::new("2", Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap(), "disk full on host1");
//!
//! assert!(!pipeline.process(first)?.is_duplicate);
//! let result = pipeline.process(second)?;
//! assert!(result.is_duplicate);
//! assert_eq!(result.representative_id.as_ref().map(|id| id.as_str()), Some("1"));
//! # Ok::<(), alertdedup::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod cli;
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod services;

pub use config::AppConfig;
pub use models::{ClassificationResult, Event, EventId};
pub use services::deduplication::{
    DeduplicationConfig, PartitionedPipeline, SimilarityScorer, StreamPipeline,
};

/// Error type for alertdedup operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Bad configuration values, unknown formats, malformed CLI arguments |
/// | `OperationFailed` | I/O errors, CSV/JSON decoding failures, logging init failures |
/// | `OutOfOrderInput` | An event's timestamp precedes the previous event of its stream |
/// | `InvalidEvent` | Empty id or message, unparseable timestamp, id already in the window |
/// | `ScorerFailure` | A similarity scorer returned a value outside 0-100 |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A configuration value is out of range (threshold, horizon, match count)
    /// - A duration string cannot be parsed
    /// - A file format cannot be determined
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Filesystem I/O errors occur
    /// - A source or sink cannot decode or encode a record
    /// - Observability has already been initialized
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// An event arrived with a timestamp earlier than its predecessor.
    ///
    /// The event is neither classified nor inserted into the window.
    #[error("event '{event_id}' at {timestamp} arrived out of order (previous event at {previous})")]
    OutOfOrderInput {
        /// Id of the rejected event.
        event_id: String,
        /// Timestamp of the rejected event (RFC 3339).
        timestamp: String,
        /// Timestamp of the last accepted event (RFC 3339).
        previous: String,
    },

    /// An event failed validation before reaching the window.
    #[error("invalid event '{event_id}': {reason}")]
    InvalidEvent {
        /// Id of the rejected event, or a row locator when the id is missing.
        event_id: String,
        /// Why the event was rejected.
        reason: String,
    },

    /// A similarity scorer violated its contract.
    ///
    /// Fatal for the event being classified. Never retried.
    #[error("scorer '{scorer}' failed: {cause}")]
    ScorerFailure {
        /// Name of the scorer.
        scorer: String,
        /// What went wrong.
        cause: String,
    },
}

impl Error {
    /// Returns true for per-event rejections that never halt a stream.
    ///
    /// ```rust
    /// use alertdedup::Error;
    ///
    /// let err = Error::InvalidEvent {
    ///     event_id: "42".to_string(),
    ///     reason: "empty message".to_string(),
    /// };
    /// assert!(err.is_rejection());
    /// assert!(!Error::InvalidInput("bad".to_string()).is_rejection());
    /// ```
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::OutOfOrderInput { .. } | Self::InvalidEvent { .. })
    }

    /// Short machine-friendly label used in logs and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::OperationFailed { .. } => "operation_failed",
            Self::OutOfOrderInput { .. } => "out_of_order",
            Self::InvalidEvent { .. } => "invalid_event",
            Self::ScorerFailure { .. } => "scorer_failure",
        }
    }
}

/// Result type alias for alertdedup operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "read_csv".to_string(),
            cause: "eof".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'read_csv' failed: eof");

        let err = Error::OutOfOrderInput {
            event_id: "2".to_string(),
            timestamp: "2024-05-01T09:59:00+00:00".to_string(),
            previous: "2024-05-01T10:00:00+00:00".to_string(),
        };
        assert!(err.to_string().contains("arrived out of order"));
    }

    #[test]
    fn test_error_classification() {
        let out_of_order = Error::OutOfOrderInput {
            event_id: "2".to_string(),
            timestamp: String::new(),
            previous: String::new(),
        };
        assert!(out_of_order.is_rejection());
        assert_eq!(out_of_order.kind(), "out_of_order");

        let scorer = Error::ScorerFailure {
            scorer: "custom".to_string(),
            cause: "NaN".to_string(),
        };
        assert!(!scorer.is_rejection());
        assert_eq!(scorer.kind(), "scorer_failure");
    }
}
