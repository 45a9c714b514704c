//! Timestamp pre-sorting for unordered inputs.

use std::collections::VecDeque;

use crate::io::traits::{EventSource, SourceRecord};
use crate::{Error, Result};

/// Event source that replays another source in timestamp order.
///
/// The inner source is drained on construction. Records with equal
/// timestamps keep their input order. Per-record rejections seen while
/// draining are replayed first, ahead of every record.
///
/// Memory grows with the whole input; only use it when the input is not
/// already ordered.
///
/// ```rust
/// use alertdedup::io::{EventSource, SortedSource, VecSource};
/// use alertdedup::models::Event;
/// use chrono::{TimeZone, Utc};
///
/// let t = |m| Utc.with_ymd_and_hms(2024, 5, 1, 10, m, 0).unwrap();
/// let mut inner = VecSource::from_events([Event::new("late", t(5), "a"), Event::new("early", t(1), "b")]);
///
/// let mut sorted = SortedSource::drain(&mut inner)?;
/// assert_eq!(sorted.next()?.map(|r| r.event.id.to_string()), Some("early".to_string()));
/// # Ok::<(), alertdedup::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct SortedSource {
    rejected: VecDeque<Error>,
    records: VecDeque<SourceRecord>,
}

impl SortedSource {
    /// Drains `source` and sorts its records by timestamp.
    ///
    /// # Errors
    ///
    /// Returns the first error that is not a per-record rejection.
    pub fn drain(source: &mut dyn EventSource) -> Result<Self> {
        let mut records = Vec::with_capacity(source.size_hint().unwrap_or_default());
        let mut rejected = VecDeque::new();

        loop {
            match source.next() {
                Ok(Some(record)) => records.push(record),
                Ok(None) => break,
                Err(e) if e.is_rejection() => rejected.push_back(e),
                Err(e) => return Err(e),
            }
        }

        // Stable: equal timestamps keep arrival order.
        records.sort_by_key(|record| record.event.timestamp);
        tracing::debug!(
            records = records.len(),
            rejected = rejected.len(),
            "Sorted input by timestamp"
        );

        Ok(Self {
            rejected,
            records: records.into(),
        })
    }
}

impl EventSource for SortedSource {
    fn next(&mut self) -> Result<Option<SourceRecord>> {
        if let Some(e) = self.rejected.pop_front() {
            return Err(e);
        }
        Ok(self.records.pop_front())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.records.len() + self.rejected.len())
    }
}
