//! Run CLI command.

use std::path::{Path, PathBuf};

use crate::io::{
    DedupRunner, Format, RunSummary, STDIO_PATH, SourceOptions, create_event_sink,
    create_event_source, create_result_sink, open_input, open_output,
};
use crate::{Error, Result};

/// Run command handler.
///
/// Reads `input`, classifies every event and writes one record per accepted
/// event to `output`. Novel events can also be copied to `novel_out`.
#[derive(Debug, Clone)]
pub struct RunCommand {
    /// Event file, or `-` for stdin.
    pub input: PathBuf,
    /// Classification output, or `-` for stdout.
    pub output: PathBuf,
    /// Optional novel-event output.
    pub novel_out: Option<PathBuf>,
    /// Input format; detected from the extension when unset.
    pub format: Option<Format>,
    /// Output format; defaults to the input format.
    pub output_format: Option<Format>,
}

impl RunCommand {
    /// Creates a run command writing classifications to stdout.
    #[must_use]
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: PathBuf::from(STDIO_PATH),
            novel_out: None,
            format: None,
            output_format: None,
        }
    }

    /// Sets the classification output path.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    /// Sets the novel-event output path.
    #[must_use]
    pub fn with_novel_out(mut self, path: impl Into<PathBuf>) -> Self {
        self.novel_out = Some(path.into());
        self
    }

    /// Sets the input format.
    #[must_use]
    pub const fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_output_format(mut self, format: Format) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Executes the run with `runner`.
    ///
    /// Sinks are finalized even when the run fails, so records written before
    /// the failure are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be opened, a format cannot be
    /// determined, or the run itself fails.
    pub fn execute(&self, runner: &DedupRunner, source_options: &SourceOptions) -> Result<RunSummary> {
        let stdout = Path::new(STDIO_PATH);
        if self.output == stdout && self.novel_out.as_deref() == Some(stdout) {
            return Err(Error::InvalidInput(
                "--output and --novel-out cannot both write to stdout".to_string(),
            ));
        }

        let input_format = Format::resolve(self.format, &self.input, Format::Json)?;
        let output_format = Format::resolve(self.output_format, &self.output, input_format)?;

        let mut source = create_event_source(open_input(&self.input)?, input_format, source_options)?;
        let mut results = create_result_sink(open_output(&self.output)?, output_format)?;
        let mut novel = match &self.novel_out {
            Some(path) => {
                let format = Format::resolve(None, path, output_format)?;
                Some(create_event_sink(open_output(path)?, format)?)
            },
            None => None,
        };

        tracing::info!(
            input = %self.input.display(),
            output = %self.output.display(),
            input_format = %input_format,
            output_format = %output_format,
            "Starting run"
        );

        let outcome = match novel.as_mut() {
            Some(sink) => runner.run(source.as_mut(), results.as_mut(), Some(sink.as_mut())),
            None => runner.run(source.as_mut(), results.as_mut(), None),
        };
        let finalized = results
            .finalize()
            .and_then(|()| novel.map_or(Ok(()), |sink| sink.finalize()));

        let summary = outcome?;
        finalized?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{RejectPolicy, RunOptions};
    use std::fs;

    const EVENTS: &str = "\
id,timestamp,message
1,2024-05-01T10:00:00Z,disk full on host1
2,2024-05-01T10:05:00Z,Disk full on host1!
3,2024-05-01T10:06:00Z,cpu load high on db2
";

    #[test]
    fn test_run_csv_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.csv");
        let output = dir.path().join("results.csv");
        fs::write(&input, EVENTS).unwrap();

        let runner = DedupRunner::new(RunOptions::default());
        let summary = RunCommand::new(&input)
            .with_output(&output)
            .execute(&runner, &SourceOptions::default())
            .unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.duplicates, 1);

        let text = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "event_id,is_duplicate,representative_id,similarity_score");
        assert_eq!(lines[2], "2,true,1,100");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_novel_out_uses_own_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.csv");
        let output = dir.path().join("results.csv");
        let novel = dir.path().join("novel.ndjson");
        fs::write(&input, EVENTS).unwrap();

        let runner = DedupRunner::new(RunOptions::default());
        RunCommand::new(&input)
            .with_output(&output)
            .with_novel_out(&novel)
            .execute(&runner, &SourceOptions::default())
            .unwrap();

        let text = fs::read_to_string(&novel).unwrap();
        let ids: Vec<String> = text
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["id"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_both_outputs_on_stdout_rejected() {
        let runner = DedupRunner::new(RunOptions::default());
        let result = RunCommand::new("events.csv")
            .with_novel_out(STDIO_PATH)
            .execute(&runner, &SourceOptions::default());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_failed_run_keeps_written_records() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.csv");
        let output = dir.path().join("results.csv");
        fs::write(
            &input,
            "id,timestamp,message\n1,2024-05-01T10:05:00Z,a\n2,2024-05-01T10:00:00Z,b\n",
        )
        .unwrap();

        let runner = DedupRunner::new(RunOptions::default().with_on_rejected(RejectPolicy::Fail));
        let result = RunCommand::new(&input)
            .with_output(&output)
            .execute(&runner, &SourceOptions::default());

        assert!(matches!(result, Err(Error::OutOfOrderInput { .. })));
        let text = fs::read_to_string(&output).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_unknown_extension_needs_format() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.log");
        fs::write(&input, "{\"timestamp\": 0, \"message\": \"a\"}\n").unwrap();
        let output = dir.path().join("results.ndjson");

        let runner = DedupRunner::new(RunOptions::default());
        let command = RunCommand::new(&input).with_output(&output);
        assert!(command.execute(&runner, &SourceOptions::default()).is_err());

        let summary = command
            .with_format(Format::Json)
            .execute(&runner, &SourceOptions::default())
            .unwrap();
        assert_eq!(summary.processed, 1);
    }
}
