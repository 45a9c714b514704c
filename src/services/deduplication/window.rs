//! Time-bounded history of recently seen events.
//!
//! Entries are kept in insertion order, which the pipeline guarantees is also
//! non-decreasing timestamp order. Memory is bounded by the horizon: after
//! every step the window holds at most the events that arrived within one
//! horizon, so its realistic upper bound is `max arrival rate x horizon`.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, VecDeque};

use crate::models::{Event, EventId};
use crate::{Error, Result};

/// An event held in the window together with its resolved root.
#[derive(Debug, Clone)]
pub struct WindowEntry {
    /// The event as received.
    pub event: Event,
    /// Root representative: the event's own id if it was novel.
    pub root: EventId,
    /// Message as prepared by the scorer.
    pub prepared: String,
}

impl WindowEntry {
    /// Creates an entry for an event that was classified novel.
    #[must_use]
    pub fn root(event: Event, prepared: String) -> Self {
        let root = event.id.clone();
        Self {
            event,
            root,
            prepared,
        }
    }

    /// Creates an entry for a duplicate linked to `root`.
    #[must_use]
    pub const fn linked(event: Event, root: EventId, prepared: String) -> Self {
        Self {
            event,
            root,
            prepared,
        }
    }

    /// Returns the event timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.event.timestamp
    }
}

/// Ordered, horizon-bounded collection of recent events.
///
/// # Ordering
///
/// The oldest entry sits at the front of the deque and the newest at the
/// back. Lookups walk from the back, so results come out most-recent-first.
///
/// # Example
///
/// ```rust
/// use alertdedup::services::deduplication::{HistoryWindow, WindowEntry};
/// use alertdedup::models::Event;
/// use chrono::{TimeDelta, TimeZone, Utc};
///
/// let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
/// let mut window = HistoryWindow::new();
/// window.insert(WindowEntry::root(Event::new("1", t0, "a"), "a".into()))?;
/// window.insert(WindowEntry::root(Event::new("2", t0 + TimeDelta::minutes(90), "b"), "b".into()))?;
///
/// let recent = window.events_within(t0 + TimeDelta::minutes(90), TimeDelta::hours(1));
/// assert_eq!(recent.len(), 1);
/// assert_eq!(recent[0].event.id.as_str(), "2");
/// # Ok::<(), alertdedup::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct HistoryWindow {
    entries: VecDeque<WindowEntry>,
    ids: HashMap<EventId, DateTime<Utc>>,
    peak_len: usize,
}

impl HistoryWindow {
    /// Creates an empty window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns held entries with `timestamp >= reference - horizon`,
    /// most recent first.
    ///
    /// Stops at the first entry older than the cutoff; everything before it
    /// is older still.
    #[must_use]
    pub fn events_within(
        &self,
        reference: DateTime<Utc>,
        horizon: TimeDelta,
    ) -> Vec<&WindowEntry> {
        let cutoff = reference - horizon;
        self.entries
            .iter()
            .rev()
            .take_while(|entry| entry.timestamp() >= cutoff)
            .collect()
    }

    /// Appends an entry as the newest one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfOrderInput`] if the entry is older than the
    /// newest held entry, or [`Error::InvalidEvent`] if its id is already
    /// held. The window is unchanged on error.
    pub fn insert(&mut self, entry: WindowEntry) -> Result<()> {
        if let Some(newest) = self.entries.back() {
            if entry.timestamp() < newest.timestamp() {
                return Err(Error::OutOfOrderInput {
                    event_id: entry.event.id.to_string(),
                    timestamp: entry.timestamp().to_rfc3339(),
                    previous: newest.timestamp().to_rfc3339(),
                });
            }
        }
        if self.ids.contains_key(&entry.event.id) {
            return Err(Error::InvalidEvent {
                event_id: entry.event.id.to_string(),
                reason: "id already present in the history window".to_string(),
            });
        }

        self.ids.insert(entry.event.id.clone(), entry.timestamp());
        self.entries.push_back(entry);
        self.peak_len = self.peak_len.max(self.entries.len());
        Ok(())
    }

    /// Removes every entry with `timestamp < cutoff` from the oldest end.
    ///
    /// Returns the number of entries removed.
    pub fn evict_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.timestamp() < cutoff)
        {
            if let Some(entry) = self.entries.pop_front() {
                self.ids.remove(&entry.event.id);
                evicted += 1;
            }
        }
        evicted
    }

    /// Returns true if an entry with this id is held and would survive
    /// eviction at `cutoff`.
    #[must_use]
    pub fn holds_since(&self, id: &EventId, cutoff: DateTime<Utc>) -> bool {
        self.ids.get(id).is_some_and(|ts| *ts >= cutoff)
    }

    /// Drops every entry. The high-water mark is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
    }

    /// Returns the number of held entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Largest number of entries held at once.
    #[must_use]
    pub const fn peak_len(&self) -> usize {
        self.peak_len
    }

    /// Iterates entries most recent first.
    pub fn iter_recent_first(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter().rev()
    }
}
