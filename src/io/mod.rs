//! Event input and result output.
//!
//! # Architecture
//!
//! The I/O subsystem uses a trait-based architecture:
//!
//! - **Format adapters** implement [`EventSource`], [`ResultSink`] and
//!   [`EventSink`]
//! - **Services** drive a source through the dedup engine into the sinks
//!
//! # Supported Formats
//!
//! | Format | Input | Output | Notes |
//! |--------|-------|--------|-------|
//! | JSON | ✓ | ✓ | NDJSON or array on input, NDJSON on output |
//! | CSV | ✓ | ✓ | Header row with aliased column names |
//!
//! # Example
//!
//! ```rust
//! use alertdedup::io::{DedupRunner, Format, RunOptions, SourceOptions, create_event_source};
//! use alertdedup::models::ClassificationResult;
//! use std::io::Cursor;
//!
//! let input = "id,timestamp,message\n1,2024-05-01 10:00:00,disk full\n2,2024-05-01 10:01:00,disk full\n";
//! let mut source = create_event_source(Cursor::new(input), Format::Csv, &SourceOptions::default())?;
//! let mut results: Vec<ClassificationResult> = Vec::new();
//!
//! let summary = DedupRunner::new(RunOptions::default()).run(source.as_mut(), &mut results, None)?;
//! assert_eq!(summary.duplicates, 1);
//! # Ok::<(), alertdedup::Error>(())
//! ```

pub mod formats;
pub mod services;
pub mod timestamp;
pub mod traits;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::{Error, Result};

// Re-exports for convenience
pub use formats::{
    Format, SourceOptions, create_event_sink, create_event_source, create_result_sink,
};
pub use services::{
    DedupRunner, ProgressCallback, RejectPolicy, RunOptions, RunProgress, RunSummary, SortedSource,
};
pub use timestamp::parse_timestamp;
pub use traits::{EventSink, EventSource, ResultSink, SourceRecord, VecSource};

/// Path that stands for stdin or stdout.
pub const STDIO_PATH: &str = "-";

/// Opens `path` for buffered reading; `-` reads stdin.
///
/// # Errors
///
/// Returns an error if the file cannot be opened.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path == Path::new(STDIO_PATH) {
        return Ok(Box::new(BufReader::new(std::io::stdin())));
    }
    let file = File::open(path).map_err(|e| Error::OperationFailed {
        operation: "open_input_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    Ok(Box::new(BufReader::new(file)))
}

/// Creates `path` for buffered writing; `-` writes stdout.
///
/// # Errors
///
/// Returns an error if the file cannot be created.
pub fn open_output(path: &Path) -> Result<Box<dyn Write + Send>> {
    if path == Path::new(STDIO_PATH) {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }
    let file = File::create(path).map_err(|e| Error::OperationFailed {
        operation: "create_output_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    Ok(Box::new(BufWriter::new(file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_open_missing_input() {
        let result = open_input(Path::new("/nonexistent/events.csv"));
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }

    #[test]
    fn test_output_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        {
            let mut out = open_output(&path).unwrap();
            writeln!(out, "hello").unwrap();
            out.flush().unwrap();
        }

        let mut text = String::new();
        open_input(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello\n");
    }
}
