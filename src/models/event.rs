//! Input event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Unique, stable identifier of an event.
///
/// Opaque to the engine; only compared for equality and hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new event ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for EventId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// A single input event: one alert or log line.
///
/// Events are immutable once created. The pipeline keeps them in its history
/// window until they fall out of the horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier.
    pub id: EventId,
    /// Event time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Text payload compared for similarity.
    pub message: String,
}

impl Event {
    /// Creates a new event.
    #[must_use]
    pub fn new(
        id: impl Into<EventId>,
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            message: message.into(),
        }
    }

    /// Checks the event carries a usable id and message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEvent`] if the id or the message is empty.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_blank() {
            return Err(Error::InvalidEvent {
                event_id: format!("<blank id at {}>", self.timestamp.to_rfc3339()),
                reason: "missing or empty id".to_string(),
            });
        }
        if self.message.trim().is_empty() {
            return Err(Error::InvalidEvent {
                event_id: self.id.to_string(),
                reason: "missing or empty message".to_string(),
            });
        }
        Ok(())
    }
}
