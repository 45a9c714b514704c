//! Format adapters for event input and result output.
//!
//! Each format implements [`EventSource`], [`ResultSink`] and [`EventSink`].

pub mod csv;
pub mod json;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use super::traits::{EventSink, EventSource, ResultSink};

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Newline-delimited JSON (a JSON array is also accepted on input).
    Json,
    /// CSV with a header row.
    Csv,
}

impl Format {
    /// Returns the file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Json => "ndjson",
            Self::Csv => "csv",
        }
    }

    /// Detects format from file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is not recognized.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match ext.as_deref() {
            Some("json" | "ndjson" | "jsonl") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            Some(ext) => Err(Error::InvalidInput(format!(
                "Unsupported file extension: .{ext}"
            ))),
            None => Err(Error::InvalidInput(
                "Cannot determine format: file has no extension".to_string(),
            )),
        }
    }

    /// Resolves the format for a path, preferring an explicit choice.
    ///
    /// `-` (stdin/stdout) has no extension and falls back to `fallback`.
    ///
    /// # Errors
    ///
    /// Returns an error if no explicit format is given and the extension is
    /// not recognized.
    pub fn resolve(explicit: Option<Self>, path: &Path, fallback: Self) -> Result<Self> {
        match explicit {
            Some(format) => Ok(format),
            None if path == Path::new("-") => Ok(fallback),
            None => Self::from_path(path),
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" | "ndjson" | "jsonl" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(Error::InvalidInput(format!("Unknown format: {s}"))),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Field mapping for event sources.
///
/// Explicit names win over the built-in aliases. Names are matched
/// case-insensitively.
///
/// | Field | Built-in aliases |
/// |-------|------------------|
/// | id | `id`, `event_id`, `_id` |
/// | timestamp | `timestamp`, `@timestamp`, `time`, `ts`, `date` |
/// | message | `message`, `msg`, `text`, `content`, `body` |
/// | partition | none; must be named |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    /// Column holding the event id.
    pub id_field: Option<String>,
    /// Column holding the timestamp.
    pub timestamp_field: Option<String>,
    /// Column holding the message.
    pub message_field: Option<String>,
    /// Column holding the partition key.
    pub partition_field: Option<String>,
}

impl SourceOptions {
    /// Sets the partition column.
    #[must_use]
    pub fn with_partition_field(mut self, field: impl Into<String>) -> Self {
        self.partition_field = Some(field.into());
        self
    }

    /// Sets the id column.
    #[must_use]
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }

    /// Sets the timestamp column.
    #[must_use]
    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = Some(field.into());
        self
    }

    /// Sets the message column.
    #[must_use]
    pub fn with_message_field(mut self, field: impl Into<String>) -> Self {
        self.message_field = Some(field.into());
        self
    }
}

/// Built-in id aliases.
pub(crate) const ID_ALIASES: &[&str] = &["id", "event_id", "_id"];
/// Built-in timestamp aliases.
pub(crate) const TIMESTAMP_ALIASES: &[&str] =
    &["timestamp", "@timestamp", "time", "ts", "date"];
/// Built-in message aliases.
pub(crate) const MESSAGE_ALIASES: &[&str] = &["message", "msg", "text", "content", "body"];

/// Finds the first name matching `explicit` (if set) or else one of `aliases`.
///
/// Alias priority follows the alias list, not the order of `names`.
pub(crate) fn match_field<'a, I>(
    names: I,
    explicit: Option<&str>,
    aliases: &[&str],
) -> Option<usize>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let position = |wanted: &str| {
        names
            .clone()
            .into_iter()
            .position(|name| name.trim().eq_ignore_ascii_case(wanted))
    };

    match explicit {
        Some(wanted) => position(wanted),
        None => aliases.iter().find_map(|alias| position(alias)),
    }
}

/// Creates an event source for the given format and reader.
///
/// # Errors
///
/// Returns an error if the header row cannot be read or required columns
/// are missing.
pub fn create_event_source<R: BufRead + 'static>(
    reader: R,
    format: Format,
    options: &SourceOptions,
) -> Result<Box<dyn EventSource>> {
    match format {
        Format::Json => Ok(Box::new(json::JsonEventSource::new(reader, options.clone()))),
        Format::Csv => Ok(Box::new(csv::CsvEventSource::new(reader, options)?)),
    }
}

/// Creates a classification sink for the given format and writer.
///
/// # Errors
///
/// Returns an error if sink creation fails.
pub fn create_result_sink<W: Write + Send + 'static>(
    writer: W,
    format: Format,
) -> Result<Box<dyn ResultSink>> {
    match format {
        Format::Json => Ok(Box::new(json::JsonResultSink::new(writer))),
        Format::Csv => Ok(Box::new(csv::CsvResultSink::new(writer))),
    }
}

/// Creates a novel-event sink for the given format and writer.
///
/// # Errors
///
/// Returns an error if sink creation fails.
pub fn create_event_sink<W: Write + Send + 'static>(
    writer: W,
    format: Format,
) -> Result<Box<dyn EventSink>> {
    match format {
        Format::Json => Ok(Box::new(json::JsonEventSink::new(writer))),
        Format::Csv => Ok(Box::new(csv::CsvEventSink::new(writer))),
    }
}
