//! CSV format adapter.
//!
//! Columns are located by header name; see [`SourceOptions`] for the
//! aliases recognized out of the box.

use crate::io::formats::{
    ID_ALIASES, MESSAGE_ALIASES, SourceOptions, TIMESTAMP_ALIASES, match_field,
};
use crate::io::timestamp::parse_timestamp;
use crate::io::traits::{EventSink, EventSource, ResultSink, SourceRecord};
use crate::models::{ClassificationResult, Event, EventId};
use crate::{Error, Result};
use std::io::{BufRead, Write};

/// CSV event source.
///
/// The first row must be a header. When there is no id column, the
/// zero-based ordinal of the data row becomes the event id.
pub struct CsvEventSource<R: BufRead> {
    reader: csv::Reader<R>,
    column_map: ColumnMap,
    /// Zero-based ordinal of the next data row.
    row: u64,
}

/// Maps CSV column indices to event fields.
#[derive(Debug)]
struct ColumnMap {
    id: Option<usize>,
    timestamp: usize,
    message: usize,
    partition: Option<usize>,
}

impl ColumnMap {
    /// Creates a column map from CSV headers.
    fn from_headers(headers: &csv::StringRecord, options: &SourceOptions) -> Result<Self> {
        let find = |explicit: Option<&String>, aliases: &[&str]| {
            match_field(headers, explicit.map(String::as_str), aliases)
        };
        let missing = |field: &str, explicit: Option<&String>, aliases: &[&str]| {
            let wanted = explicit.map_or_else(|| aliases.join("', '"), Clone::clone);
            Error::InvalidInput(format!("CSV must have a {field} column ('{wanted}')"))
        };

        let id = find(options.id_field.as_ref(), ID_ALIASES);
        if id.is_none() && options.id_field.is_some() {
            return Err(missing("id", options.id_field.as_ref(), ID_ALIASES));
        }

        let timestamp = find(options.timestamp_field.as_ref(), TIMESTAMP_ALIASES).ok_or_else(
            || missing("timestamp", options.timestamp_field.as_ref(), TIMESTAMP_ALIASES),
        )?;
        let message = find(options.message_field.as_ref(), MESSAGE_ALIASES).ok_or_else(|| {
            missing("message", options.message_field.as_ref(), MESSAGE_ALIASES)
        })?;

        let partition = match options.partition_field.as_ref() {
            Some(name) => Some(
                find(Some(name), &[])
                    .ok_or_else(|| missing("partition", Some(name), &[]))?,
            ),
            None => None,
        };

        Ok(Self {
            id,
            timestamp,
            message,
            partition,
        })
    }
}

impl<R: BufRead> CsvEventSource<R> {
    /// Creates a new CSV event source.
    ///
    /// # Errors
    ///
    /// Returns an error if headers cannot be read or the timestamp or
    /// message column is missing.
    pub fn new(reader: R, options: &SourceOptions) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // Allow varying number of fields
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| Error::OperationFailed {
                operation: "read_csv_headers".to_string(),
                cause: e.to_string(),
            })?
            .clone();
        let column_map = ColumnMap::from_headers(&headers, options)?;

        Ok(Self {
            reader: csv_reader,
            column_map,
            row: 0,
        })
    }

    /// Parses a record into a source record.
    fn parse_record(&self, record: &csv::StringRecord, row: u64) -> Result<SourceRecord> {
        let get_field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::trim);

        let id = match self.column_map.id {
            Some(idx) => EventId::new(get_field(Some(idx)).unwrap_or_default()),
            None => EventId::from(row),
        };

        let raw_timestamp = get_field(Some(self.column_map.timestamp)).unwrap_or_default();
        let timestamp = parse_timestamp(raw_timestamp).map_err(|e| Error::InvalidEvent {
            event_id: row_locator(&id, row),
            reason: e.to_string(),
        })?;

        // Message whitespace is left to the scorer.
        let message = record.get(self.column_map.message).unwrap_or_default();

        let mut source_record = SourceRecord::new(Event::new(id, timestamp, message));
        if let Some(partition) = get_field(self.column_map.partition).filter(|s| !s.is_empty()) {
            source_record = source_record.with_partition(partition);
        }
        Ok(source_record)
    }
}

impl<R: BufRead> EventSource for CsvEventSource<R> {
    fn next(&mut self) -> Result<Option<SourceRecord>> {
        let mut record = csv::StringRecord::new();

        let row = self.row;
        let has_record = match self.reader.read_record(&mut record) {
            Ok(has_record) => has_record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Utf8 { .. }) => {
                self.row += 1;
                return Err(Error::InvalidEvent {
                    event_id: format!("row {row}"),
                    reason: e.to_string(),
                });
            },
            Err(e) => {
                return Err(Error::OperationFailed {
                    operation: "read_csv".to_string(),
                    cause: e.to_string(),
                });
            },
        };
        if !has_record {
            return Ok(None);
        }

        self.row += 1;
        self.parse_record(&record, row).map(Some)
    }
}

/// Identifies a row in errors: its id when present, its ordinal otherwise.
fn row_locator(id: &EventId, row: u64) -> String {
    if id.is_blank() {
        format!("row {row}")
    } else {
        id.to_string()
    }
}

fn write_error(operation: &str, e: &csv::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

fn flush_error(e: &std::io::Error) -> Error {
    Error::OperationFailed {
        operation: "flush_csv".to_string(),
        cause: e.to_string(),
    }
}

/// CSV classification sink.
///
/// Columns: `event_id,is_duplicate,representative_id,similarity_score`.
/// Novel events leave the last two empty.
pub struct CsvResultSink<W: Write> {
    writer: csv::Writer<W>,
    /// Whether headers have been written.
    headers_written: bool,
}

impl<W: Write> CsvResultSink<W> {
    /// Creates a new CSV classification sink.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false) // We write headers manually
                .from_writer(writer),
            headers_written: false,
        }
    }

    fn ensure_headers(&mut self) -> Result<()> {
        if !self.headers_written {
            self.writer
                .write_record([
                    "event_id",
                    "is_duplicate",
                    "representative_id",
                    "similarity_score",
                ])
                .map_err(|e| write_error("write_csv_headers", &e))?;
            self.headers_written = true;
        }
        Ok(())
    }
}

impl<W: Write + Send> ResultSink for CsvResultSink<W> {
    fn write(&mut self, result: &ClassificationResult) -> Result<()> {
        self.ensure_headers()?;

        let score = result
            .similarity_score
            .map(|s| s.to_string())
            .unwrap_or_default();
        self.writer
            .write_record([
                result.event_id.as_str(),
                if result.is_duplicate { "true" } else { "false" },
                result.representative_id.as_ref().map_or("", EventId::as_str),
                score.as_str(),
            ])
            .map_err(|e| write_error("write_csv", &e))
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        // An empty run still produces a header-only file.
        self.ensure_headers()?;
        self.writer.flush().map_err(|e| flush_error(&e))
    }
}

/// CSV sink for novel events: `id,timestamp,message`.
pub struct CsvEventSink<W: Write> {
    writer: csv::Writer<W>,
    headers_written: bool,
}

impl<W: Write> CsvEventSink<W> {
    /// Creates a new CSV event sink.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(writer),
            headers_written: false,
        }
    }

    fn ensure_headers(&mut self) -> Result<()> {
        if !self.headers_written {
            self.writer
                .write_record(["id", "timestamp", "message"])
                .map_err(|e| write_error("write_csv_headers", &e))?;
            self.headers_written = true;
        }
        Ok(())
    }
}

impl<W: Write + Send> EventSink for CsvEventSink<W> {
    fn write(&mut self, event: &Event) -> Result<()> {
        self.ensure_headers()?;
        self.writer
            .write_record([
                event.id.as_str(),
                event.timestamp.to_rfc3339().as_str(),
                event.message.as_str(),
            ])
            .map_err(|e| write_error("write_csv", &e))
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        self.ensure_headers()?;
        self.writer.flush().map_err(|e| flush_error(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Cursor;

    fn source(input: &'static str) -> CsvEventSource<Cursor<&'static str>> {
        CsvEventSource::new(Cursor::new(input), &SourceOptions::default()).unwrap()
    }

    #[test]
    fn test_read_basic_csv() {
        let mut source = source(
            "id,timestamp,message\n\
             a1,2024-05-01 10:00:00,disk full\n\
             a2,2024-05-01T10:05:00Z,\"disk full, again\"\n",
        );

        let first = source.next().unwrap().unwrap();
        assert_eq!(first.event.id.as_str(), "a1");
        assert_eq!(
            first.event.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(first.event.message, "disk full");
        assert!(first.partition.is_none());

        let second = source.next().unwrap().unwrap();
        assert_eq!(second.event.message, "disk full, again");
        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_header_aliases() {
        let mut source = source("_id,@timestamp,Msg\nx,1714557600,cpu spike\n");
        let record = source.next().unwrap().unwrap();
        assert_eq!(record.event.id.as_str(), "x");
        assert_eq!(record.event.message, "cpu spike");
    }

    #[test]
    fn test_missing_id_column_uses_row_ordinal() {
        let mut source = source("timestamp,message\n1714557600,a\n1714557601,b\n");
        assert_eq!(source.next().unwrap().unwrap().event.id.as_str(), "0");
        assert_eq!(source.next().unwrap().unwrap().event.id.as_str(), "1");
    }

    #[test]
    fn test_missing_required_column() {
        let result = CsvEventSource::new(Cursor::new("id,message\n1,x\n"), &SourceOptions::default());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_bad_row_does_not_stop_reading() {
        let mut source = source(
            "id,timestamp,message\n\
             1,not a time,x\n\
             2,1714557600,y\n",
        );

        let err = source.next().unwrap_err();
        assert!(matches!(err, Error::InvalidEvent { ref event_id, .. } if event_id == "1"));
        assert_eq!(source.next().unwrap().unwrap().event.id.as_str(), "2");
    }

    #[test]
    fn test_invalid_utf8_row_does_not_stop_reading() {
        let input: &[u8] = b"id,timestamp,message\n\
            1,1714557600,disk full\n\
            2,1714557601,bad \xff\xfe\n\
            3,1714557602,disk full\n";
        let mut source = CsvEventSource::new(Cursor::new(input), &SourceOptions::default()).unwrap();

        assert_eq!(source.next().unwrap().unwrap().event.id.as_str(), "1");
        let err = source.next().unwrap_err();
        assert!(matches!(err, Error::InvalidEvent { ref event_id, .. } if event_id == "row 1"));
        assert_eq!(source.next().unwrap().unwrap().event.id.as_str(), "3");
        assert!(source.next().unwrap().is_none());
    }

    #[test]
    fn test_message_whitespace_is_kept() {
        let mut source = source("id , timestamp ,message\n 7 ,1714557600,  disk full  \n");
        let record = source.next().unwrap().unwrap();
        assert_eq!(record.event.id.as_str(), "7");
        assert_eq!(record.event.message, "  disk full  ");
    }

    #[test]
    fn test_partition_and_explicit_columns() {
        let options = SourceOptions::default()
            .with_partition_field("host")
            .with_message_field("summary");
        let input = "id,ts,host,summary,message\n1,1714557600,web-01,down,ignored\n2,1714557601,,up,x\n";
        let mut source = CsvEventSource::new(Cursor::new(input), &options).unwrap();

        let first = source.next().unwrap().unwrap();
        assert_eq!(first.partition.as_deref(), Some("web-01"));
        assert_eq!(first.event.message, "down");

        let second = source.next().unwrap().unwrap();
        assert!(second.partition.is_none());
    }

    #[test]
    fn test_unknown_partition_column() {
        let options = SourceOptions::default().with_partition_field("tenant");
        let result = CsvEventSource::new(Cursor::new("ts,message\n"), &options);
        assert!(result.is_err());
    }

    #[test]
    fn test_write_results() {
        let mut output = Vec::new();
        {
            let mut sink = CsvResultSink::new(&mut output);
            sink.write(&ClassificationResult::novel("1".into())).unwrap();
            sink.write(&ClassificationResult::duplicate("2".into(), "1".into(), 97.0))
                .unwrap();
            Box::new(sink).finalize().unwrap();
        }

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "event_id,is_duplicate,representative_id,similarity_score");
        assert_eq!(lines[1], "1,false,,");
        assert_eq!(lines[2], "2,true,1,97");
    }

    #[test]
    fn test_empty_result_sink_writes_header() {
        let mut output = Vec::new();
        Box::new(CsvResultSink::new(&mut output)).finalize().unwrap();
        assert!(String::from_utf8(output).unwrap().starts_with("event_id,"));
    }

    #[test]
    fn test_write_events() {
        let mut output = Vec::new();
        {
            let mut sink = CsvEventSink::new(&mut output);
            let ts = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
            sink.write(&Event::new("1", ts, "disk full")).unwrap();
            Box::new(sink).finalize().unwrap();
        }

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("1,2024-05-01T10:00:00+00:00,disk full"));
    }
}
