//! JSON format adapter.
//!
//! Supports both newline-delimited JSON (NDJSON/JSONL) and JSON arrays on
//! input; always writes NDJSON.

use crate::io::formats::{
    ID_ALIASES, MESSAGE_ALIASES, SourceOptions, TIMESTAMP_ALIASES, match_field,
};
use crate::io::timestamp::{from_epoch_f64, parse_timestamp};
use crate::io::traits::{EventSink, EventSource, ResultSink, SourceRecord};
use crate::models::{ClassificationResult, Event, EventId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::io::{BufRead, Write};

/// JSON event source.
///
/// Automatically detects and handles both layouts:
/// - **NDJSON/JSONL**: One JSON object per line
/// - **Array**: A JSON array of objects `[{...}, {...}]`
///
/// In NDJSON mode a malformed line is reported as
/// [`Error::InvalidEvent`] and reading continues with the next line.
pub struct JsonEventSource<R: BufRead> {
    reader: R,
    options: SourceOptions,
    /// Parsed objects when reading array layout.
    buffer: VecDeque<Value>,
    /// First NDJSON line, consumed during detection.
    pending_line: Option<Vec<u8>>,
    /// Whether we've detected and started parsing.
    started: bool,
    /// Whether we're in array mode.
    array_mode: bool,
    /// Line number for error reporting.
    line_number: usize,
    /// Zero-based ordinal of the next record.
    row: u64,
}

impl<R: BufRead> JsonEventSource<R> {
    /// Creates a new JSON event source.
    #[must_use]
    pub const fn new(reader: R, options: SourceOptions) -> Self {
        Self {
            reader,
            options,
            buffer: VecDeque::new(),
            pending_line: None,
            started: false,
            array_mode: false,
            line_number: 0,
            row: 0,
        }
    }

    /// Reads the next non-blank line as raw bytes, if any.
    fn read_nonblank_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let bytes_read = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(|e| read_error(&e))?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            if !line.trim_ascii().is_empty() {
                return Ok(Some(line));
            }
        }
    }

    /// Peeks at the first non-blank line to detect the layout.
    fn detect_format(&mut self) -> Result<()> {
        self.started = true;
        let Some(mut first_line) = self.read_nonblank_line()? else {
            return Ok(());
        };

        if first_line.trim_ascii_start().starts_with(b"[") {
            self.array_mode = true;
            self.reader
                .read_to_end(&mut first_line)
                .map_err(|e| read_error(&e))?;

            let records: Vec<Value> =
                serde_json::from_slice(&first_line).map_err(|e| Error::OperationFailed {
                    operation: "read_json".to_string(),
                    cause: format!("failed to parse JSON array: {e}"),
                })?;
            self.buffer = records.into();
        } else {
            self.pending_line = Some(first_line);
        }
        Ok(())
    }

    fn next_value(&mut self) -> Result<Option<Value>> {
        if self.array_mode {
            return Ok(self.buffer.pop_front());
        }

        let line = match self.pending_line.take() {
            Some(line) => line,
            None => match self.read_nonblank_line()? {
                Some(line) => line,
                None => return Ok(None),
            },
        };

        let invalid = |reason: String| Error::InvalidEvent {
            event_id: format!("line {}", self.line_number),
            reason,
        };
        let line = String::from_utf8(line).map_err(|e| invalid(format!("invalid UTF-8: {e}")))?;
        serde_json::from_str(line.trim())
            .map(Some)
            .map_err(|e| invalid(format!("failed to parse JSON: {e}")))
    }
}

impl<R: BufRead> EventSource for JsonEventSource<R> {
    fn next(&mut self) -> Result<Option<SourceRecord>> {
        if !self.started {
            self.detect_format()?;
        }

        let value = self.next_value();
        let row = self.row;
        match value {
            Ok(Some(value)) => {
                self.row += 1;
                record_from_value(&value, row, &self.options).map(Some)
            },
            Ok(None) => Ok(None),
            Err(e) => {
                self.row += 1;
                Err(e)
            },
        }
    }

    fn size_hint(&self) -> Option<usize> {
        if self.array_mode {
            Some(self.buffer.len())
        } else {
            None
        }
    }
}

/// Converts one JSON object into a source record.
fn record_from_value(value: &Value, row: u64, options: &SourceOptions) -> Result<SourceRecord> {
    let Value::Object(object) = value else {
        return Err(Error::InvalidEvent {
            event_id: format!("row {row}"),
            reason: "expected a JSON object".to_string(),
        });
    };

    let id = match field(object, options.id_field.as_deref(), ID_ALIASES) {
        None | Some(Value::Null) => EventId::from(row),
        Some(value) => EventId::new(scalar_to_string(value)),
    };
    let invalid = |reason: String| Error::InvalidEvent {
        event_id: if id.is_blank() {
            format!("row {row}")
        } else {
            id.to_string()
        },
        reason,
    };

    let timestamp = match field(object, options.timestamp_field.as_deref(), TIMESTAMP_ALIASES) {
        None | Some(Value::Null) => return Err(invalid("missing timestamp".to_string())),
        Some(value) => value_to_timestamp(value).map_err(invalid)?,
    };

    let message = match field(object, options.message_field.as_deref(), MESSAGE_ALIASES) {
        None | Some(Value::Null) => String::new(),
        Some(value) => scalar_to_string(value),
    };

    let partition = options
        .partition_field
        .as_deref()
        .and_then(|name| field(object, Some(name), &[]))
        .filter(|value| !value.is_null())
        .map(scalar_to_string)
        .filter(|s| !s.trim().is_empty());

    let record = SourceRecord::new(Event::new(id, timestamp, message));
    Ok(match partition {
        Some(partition) => record.with_partition(partition),
        None => record,
    })
}

fn field<'a>(
    object: &'a Map<String, Value>,
    explicit: Option<&str>,
    aliases: &[&str],
) -> Option<&'a Value> {
    let keys: Vec<&str> = object.keys().map(String::as_str).collect();
    let idx = match_field(keys.iter().copied(), explicit, aliases)?;
    keys.get(idx).and_then(|key| object.get(*key))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_timestamp(value: &Value) -> std::result::Result<DateTime<Utc>, String> {
    match value {
        Value::String(s) => parse_timestamp(s).map_err(|e| e.to_string()),
        Value::Number(n) => {
            let parsed = match n.as_i64() {
                Some(secs) => DateTime::from_timestamp(secs, 0),
                None => n.as_f64().and_then(from_epoch_f64),
            };
            parsed.ok_or_else(|| format!("timestamp out of range: {n}"))
        },
        other => Err(format!("unsupported timestamp value: {other}")),
    }
}

fn read_error(e: &std::io::Error) -> Error {
    Error::OperationFailed {
        operation: "read_json".to_string(),
        cause: e.to_string(),
    }
}

fn write_line<W: Write, T: serde::Serialize>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, value).map_err(|e| Error::OperationFailed {
        operation: "write_json".to_string(),
        cause: e.to_string(),
    })?;
    writeln!(writer).map_err(|e| Error::OperationFailed {
        operation: "write_json".to_string(),
        cause: e.to_string(),
    })
}

fn flush<W: Write>(writer: &mut W) -> Result<()> {
    writer.flush().map_err(|e| Error::OperationFailed {
        operation: "flush_json".to_string(),
        cause: e.to_string(),
    })
}

/// NDJSON classification sink.
pub struct JsonResultSink<W: Write> {
    writer: W,
    /// Number of records written.
    count: usize,
}

impl<W: Write> JsonResultSink<W> {
    /// Creates a new JSON classification sink.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self { writer, count: 0 }
    }

    /// Number of records written so far.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }
}

impl<W: Write + Send> ResultSink for JsonResultSink<W> {
    fn write(&mut self, result: &ClassificationResult) -> Result<()> {
        write_line(&mut self.writer, result)?;
        self.count += 1;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        flush(&mut self.writer)
    }
}

/// NDJSON sink for novel events.
pub struct JsonEventSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonEventSink<W> {
    /// Creates a new JSON event sink.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> EventSink for JsonEventSink<W> {
    fn write(&mut self, event: &Event) -> Result<()> {
        write_line(&mut self.writer, event)
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        flush(&mut self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn source(input: &'static str) -> JsonEventSource<Cursor<&'static str>> {
        JsonEventSource::new(Cursor::new(input), SourceOptions::default())
    }

    #[test]
    fn test_read_ndjson() {
        let mut source = source(
            r#"{"id": "a", "timestamp": "2024-05-01T10:00:00Z", "message": "disk full"}

{"id": 7, "@timestamp": 1714557660, "Message": "disk full"}
"#,
        );

        let first = source.next().unwrap().unwrap();
        assert_eq!(first.event.id.as_str(), "a");
        assert_eq!(
            first.event.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );

        let second = source.next().unwrap().unwrap();
        assert_eq!(second.event.id.as_str(), "7");
        assert_eq!(
            second.event.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 1, 0).unwrap()
        );
        assert_eq!(second.event.message, "disk full");
        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_read_array() {
        let mut source = source(
            r#"[
  {"timestamp": "2024-05-01 10:00:00", "msg": "a"},
  {"timestamp": "2024-05-01 10:00:01", "msg": "b"}
]"#,
        );

        let first = source.next().unwrap().unwrap();
        assert_eq!(first.event.id.as_str(), "0");
        assert_eq!(source.size_hint(), Some(1));

        let second = source.next().unwrap().unwrap();
        assert_eq!(second.event.id.as_str(), "1");
        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_malformed_line_does_not_stop_reading() {
        let mut source = source(
            "{\"id\": \"1\", \"ts\": 1714557600, \"message\": \"x\"}\n\
             {not json\n\
             {\"id\": \"2\", \"ts\": 1714557601, \"message\": \"y\"}\n",
        );

        assert!(source.next().is_ok());
        let err = source.next().unwrap_err();
        assert!(matches!(err, Error::InvalidEvent { ref event_id, .. } if event_id == "line 2"));
        assert_eq!(source.next().unwrap().unwrap().event.id.as_str(), "2");
    }

    #[test]
    fn test_invalid_utf8_line_does_not_stop_reading() {
        let input: &[u8] = b"{\"id\": \"1\", \"ts\": 1714557600, \"message\": \"disk full\"}\n\
            {\"id\": \"2\", \"ts\": 1714557601, \"message\": \"bad \xff\xfe\"}\n\
            {\"id\": \"3\", \"ts\": 1714557602, \"message\": \"disk full\"}\n";
        let mut source = JsonEventSource::new(Cursor::new(input), SourceOptions::default());

        assert_eq!(source.next().unwrap().unwrap().event.id.as_str(), "1");
        let err = source.next().unwrap_err();
        assert!(matches!(err, Error::InvalidEvent { ref event_id, .. } if event_id == "line 2"));
        assert_eq!(source.next().unwrap().unwrap().event.id.as_str(), "3");
        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_missing_timestamp_is_invalid_event() {
        let mut source = source(r#"{"id": "9", "message": "x"}"#);
        let err = source.next().unwrap_err();
        assert!(matches!(err, Error::InvalidEvent { ref event_id, .. } if event_id == "9"));
    }

    #[test]
    fn test_partition_field() {
        let input = r#"{"id": "1", "ts": 1714557600, "message": "x", "host": "db-01"}"#;
        let options = SourceOptions::default().with_partition_field("host");
        let mut source = JsonEventSource::new(Cursor::new(input), options);

        let record = source.next().unwrap().unwrap();
        assert_eq!(record.partition.as_deref(), Some("db-01"));
    }

    #[test]
    fn test_empty_input() {
        let mut source = source("\n\n");
        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_malformed_array_is_fatal() {
        let mut source = source("[{\"id\": 1},");
        assert!(matches!(source.next(), Err(Error::OperationFailed { .. })));
    }

    #[test]
    fn test_write_results() {
        let mut output = Vec::new();
        {
            let mut sink = JsonResultSink::new(&mut output);
            sink.write(&ClassificationResult::duplicate("2".into(), "1".into(), 100.0))
                .unwrap();
            assert_eq!(sink.count(), 1);
            Box::new(sink).finalize().unwrap();
        }

        let line = String::from_utf8(output).unwrap();
        let parsed: ClassificationResult = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed.representative_id, Some(EventId::new("1")));
        assert_eq!(parsed.similarity_score, Some(100.0));
    }

    #[test]
    fn test_write_events() {
        let mut output = Vec::new();
        {
            let mut sink = JsonEventSink::new(&mut output);
            let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
            sink.write(&Event::new("1", ts, "disk full")).unwrap();
            Box::new(sink).finalize().unwrap();
        }

        let line = String::from_utf8(output).unwrap();
        let parsed: Event = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed.message, "disk full");
    }
}
