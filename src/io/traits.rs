//! Core traits for reading events and writing results.
//!
//! Format adapters implement [`EventSource`], [`ResultSink`] and
//! [`EventSink`]; the runner only talks to these traits.

use crate::Result;
use crate::models::{ClassificationResult, Event};

/// One event read from a source, with its optional partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// The parsed event.
    pub event: Event,
    /// Partition key (host, tenant, ...), if the source has one.
    pub partition: Option<String>,
}

impl SourceRecord {
    /// Creates a record without a partition key.
    #[must_use]
    pub const fn new(event: Event) -> Self {
        Self {
            event,
            partition: None,
        }
    }

    /// Sets the partition key.
    #[must_use]
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }
}

/// Source of events.
///
/// Implementations read incrementally where the format allows it, so large
/// inputs are never loaded whole.
///
/// # Errors and recovery
///
/// A record that cannot be turned into an event is reported as
/// [`crate::Error::InvalidEvent`]; the caller may keep calling `next` and
/// reading resumes with the following record. Any other error means the
/// source itself is broken and further calls are meaningless.
pub trait EventSource {
    /// Reads the next record.
    ///
    /// Returns `Ok(None)` when the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if a record is malformed or I/O fails.
    fn next(&mut self) -> Result<Option<SourceRecord>>;

    /// Estimated number of remaining records, if known.
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

/// Sink for classification records.
///
/// # Lifecycle
///
/// 1. Create the sink with its output destination
/// 2. Call `write()` for every classified event, in stream order
/// 3. Call `finalize()` to flush
pub trait ResultSink {
    /// Writes one classification record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or I/O fails.
    fn write(&mut self, result: &ClassificationResult) -> Result<()>;

    /// Flushes and closes the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if I/O fails.
    fn finalize(self: Box<Self>) -> Result<()>;
}

/// Sink for the deduplicated event stream (novel events only).
pub trait EventSink {
    /// Writes one event.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or I/O fails.
    fn write(&mut self, event: &Event) -> Result<()>;

    /// Flushes and closes the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if I/O fails.
    fn finalize(self: Box<Self>) -> Result<()>;
}

impl ResultSink for Vec<ClassificationResult> {
    fn write(&mut self, result: &ClassificationResult) -> Result<()> {
        self.push(result.clone());
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl EventSink for Vec<Event> {
    fn write(&mut self, event: &Event) -> Result<()> {
        self.push(event.clone());
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// In-memory [`EventSource`] over a list of records.
///
/// Useful for tests and for replaying records that were already collected.
#[derive(Debug, Default)]
pub struct VecSource {
    records: std::collections::VecDeque<Result<SourceRecord>>,
}

impl VecSource {
    /// Creates a source yielding the given events without partitions.
    #[must_use]
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            records: events
                .into_iter()
                .map(|event| Ok(SourceRecord::new(event)))
                .collect(),
        }
    }

    /// Creates a source yielding the given items in order, errors included.
    #[must_use]
    pub fn from_results(items: impl IntoIterator<Item = Result<SourceRecord>>) -> Self {
        Self {
            records: items.into_iter().collect(),
        }
    }
}

impl EventSource for VecSource {
    fn next(&mut self) -> Result<Option<SourceRecord>> {
        self.records.pop_front().transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.records.len())
    }
}
