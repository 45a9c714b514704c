//! Batch dedup runner.
//!
//! Drives an [`EventSource`] through a [`PartitionedPipeline`] into the
//! result sinks, applying the rejection policy and honoring cancellation.

#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::instrument;

use crate::io::services::sorted::SortedSource;
use crate::io::traits::{EventSink, EventSource, ResultSink};
use crate::services::deduplication::{
    DeduplicationConfig, FuzzRatio, PartitionedPipeline, PipelineStats, SimilarityScorer,
};
use crate::{Error, Result};

/// Upper bound on rejection messages kept in a [`RunSummary`].
pub const MAX_REPORTED_ERRORS: usize = 100;

/// What to do with an event that cannot be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectPolicy {
    /// Log, count and continue with the next event.
    #[default]
    Skip,
    /// Stop the run with the error.
    Fail,
}

impl RejectPolicy {
    /// Returns the policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Fail => "fail",
        }
    }
}

impl FromStr for RejectPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "skip" | "continue" => Ok(Self::Skip),
            "fail" | "abort" | "stop" => Ok(Self::Fail),
            other => Err(Error::InvalidInput(format!("unknown rejection policy: {other}"))),
        }
    }
}

/// Options for a dedup run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Engine configuration shared by every partition.
    pub dedup: DeduplicationConfig,
    /// Rejection handling.
    pub on_rejected: RejectPolicy,
    /// Sort the whole input by timestamp before streaming it.
    pub sort: bool,
}

impl RunOptions {
    /// Creates options around an engine configuration.
    #[must_use]
    pub fn new(dedup: DeduplicationConfig) -> Self {
        Self {
            dedup,
            ..Self::default()
        }
    }

    /// Sets the rejection policy.
    #[must_use]
    pub const fn with_on_rejected(mut self, policy: RejectPolicy) -> Self {
        self.on_rejected = policy;
        self
    }

    /// Enables or disables pre-sorting.
    #[must_use]
    pub const fn with_sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }
}

/// Progress callback for dedup runs.
pub type ProgressCallback = Box<dyn Fn(&RunProgress) + Send>;

/// Progress information during a run.
#[derive(Debug, Clone, Default)]
pub struct RunProgress {
    /// Records pulled from the source, rejected ones included.
    pub read: usize,
    /// Events classified.
    pub processed: usize,
    /// Events classified as duplicates.
    pub duplicates: usize,
    /// Records rejected so far.
    pub rejected: usize,
    /// Estimated total records (if known).
    pub total_estimate: Option<usize>,
}

impl RunProgress {
    /// Returns the percentage complete (0-100) if the total is known.
    #[must_use]
    pub fn percent_complete(&self) -> Option<f32> {
        self.total_estimate.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.read as f32 / total as f32) * 100.0
            }
        })
    }
}

/// Outcome of a dedup run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Events classified.
    pub processed: u64,
    /// Events classified as duplicates.
    pub duplicates: u64,
    /// Events classified as novel.
    pub novel: u64,
    /// Events rejected for arriving out of order.
    pub rejected_out_of_order: u64,
    /// Events rejected by validation, at the source or in the pipeline.
    pub rejected_invalid: u64,
    /// Events dropped because the scorer misbehaved.
    pub scorer_failures: u64,
    /// Window entries evicted across all partitions.
    pub evicted: u64,
    /// Window resets across all partitions.
    pub resets: u64,
    /// Number of partitions seen.
    pub partitions: usize,
    /// Largest window held by any partition.
    pub peak_window_len: usize,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
    /// First rejection messages, up to [`MAX_REPORTED_ERRORS`].
    pub errors: Vec<String>,
}

impl RunSummary {
    /// Total events that produced no classification.
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.rejected_out_of_order + self.rejected_invalid + self.scorer_failures
    }

    /// Share of classified events that were duplicates (0.0-1.0).
    #[must_use]
    pub fn duplicate_ratio(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.processed as f64
        }
    }

    fn absorb(&mut self, stats: &PipelineStats) {
        self.processed += stats.processed;
        self.duplicates += stats.duplicates;
        self.novel += stats.novel;
        self.rejected_out_of_order += stats.rejected_out_of_order;
        self.rejected_invalid += stats.rejected_invalid;
        self.scorer_failures += stats.scorer_failures;
        self.evicted += stats.evicted;
        self.resets += stats.resets;
        self.peak_window_len = self.peak_window_len.max(stats.peak_window_len);
    }

    fn note_error(&mut self, error: &Error) {
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(error.to_string());
        }
    }
}

/// Runs a source through the dedup engine.
///
/// # Example
///
/// ```rust
/// use alertdedup::io::{DedupRunner, RunOptions, VecSource};
/// use alertdedup::models::{ClassificationResult, Event};
/// use chrono::{TimeZone, Utc};
///
/// let t = |m| Utc.with_ymd_and_hms(2024, 5, 1, 10, m, 0).unwrap();
/// let mut source = VecSource::from_events([
///     Event::new("1", t(0), "disk full on host1"),
///     Event::new("2", t(5), "disk full on host1"),
/// ]);
/// let mut results: Vec<ClassificationResult> = Vec::new();
///
/// let summary = DedupRunner::new(RunOptions::default()).run(&mut source, &mut results, None)?;
/// assert_eq!(summary.duplicates, 1);
/// assert!(results[1].is_duplicate);
/// # Ok::<(), alertdedup::Error>(())
/// ```
pub struct DedupRunner<S: SimilarityScorer + Clone = FuzzRatio> {
    options: RunOptions,
    scorer: S,
    cancel: Option<Arc<AtomicBool>>,
    progress: Option<ProgressCallback>,
}

impl DedupRunner<FuzzRatio> {
    /// Creates a runner using the built-in [`FuzzRatio`] scorer.
    #[must_use]
    pub const fn new(options: RunOptions) -> Self {
        let scorer = FuzzRatio::new(options.dedup.normalize);
        Self {
            options,
            scorer,
            cancel: None,
            progress: None,
        }
    }
}

impl<S: SimilarityScorer + Clone> DedupRunner<S> {
    /// Replaces the scorer used by every partition.
    #[must_use]
    pub fn with_scorer<T: SimilarityScorer + Clone>(self, scorer: T) -> DedupRunner<T> {
        DedupRunner {
            options: self.options,
            scorer,
            cancel: self.cancel,
            progress: self.progress,
        }
    }

    /// Stops the run at the next event boundary once `flag` is set.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Reports progress after every record.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Returns the run options.
    #[must_use]
    pub const fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Classifies every record of `source`.
    ///
    /// Results are written to `results` in input order. Novel events are
    /// also written to `novel` when given. Sinks are not finalized.
    ///
    /// # Errors
    ///
    /// Returns an error if the source or a sink fails, if the configuration
    /// is invalid, or on the first rejection under [`RejectPolicy::Fail`].
    #[instrument(
        skip_all,
        fields(
            operation = "dedup_run",
            on_rejected = self.options.on_rejected.as_str(),
            sort = self.options.sort
        )
    )]
    pub fn run(
        &self,
        source: &mut dyn EventSource,
        results: &mut dyn ResultSink,
        novel: Option<&mut dyn EventSink>,
    ) -> Result<RunSummary> {
        if self.options.sort {
            let mut sorted = SortedSource::drain(source)?;
            return self.run_ordered(&mut sorted, results, novel);
        }
        self.run_ordered(source, results, novel)
    }

    fn run_ordered(
        &self,
        source: &mut dyn EventSource,
        results: &mut dyn ResultSink,
        mut novel: Option<&mut dyn EventSink>,
    ) -> Result<RunSummary> {
        let mut pipeline =
            PartitionedPipeline::with_scorer(self.options.dedup.clone(), self.scorer.clone())?;
        let mut summary = RunSummary::default();
        let mut source_rejected = 0_u64;
        let mut progress = RunProgress {
            total_estimate: source.size_hint(),
            ..RunProgress::default()
        };

        loop {
            if self.is_cancelled() {
                tracing::warn!(read = progress.read, "Run cancelled");
                summary.cancelled = true;
                break;
            }

            let record = match source.next() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) if e.is_rejection() => {
                    progress.read += 1;
                    progress.rejected += 1;
                    source_rejected += 1;
                    metrics::counter!("dedup_rejected_total", "reason" => e.kind()).increment(1);
                    self.handle_rejection(e, &mut summary)?;
                    self.report(&progress);
                    continue;
                },
                Err(e) => return Err(e),
            };
            progress.read += 1;

            let novel_copy = novel.is_some().then(|| record.event.clone());
            match pipeline.process(record.partition.as_deref(), record.event) {
                Ok(result) => {
                    results.write(&result)?;
                    progress.processed += 1;
                    if result.is_duplicate {
                        progress.duplicates += 1;
                    } else if let (Some(sink), Some(event)) = (novel.as_deref_mut(), novel_copy) {
                        sink.write(&event)?;
                    }
                },
                Err(e) if e.is_rejection() || matches!(e, Error::ScorerFailure { .. }) => {
                    progress.rejected += 1;
                    self.handle_rejection(e, &mut summary)?;
                },
                Err(e) => return Err(e),
            }
            self.report(&progress);
        }

        summary.partitions = pipeline.partition_count();
        summary.absorb(&pipeline.stats());
        summary.rejected_invalid += source_rejected;
        for (partition, stats) in pipeline.finish() {
            tracing::debug!(
                partition = %partition,
                processed = stats.processed,
                duplicates = stats.duplicates,
                peak_window_len = stats.peak_window_len,
                "Partition finished"
            );
        }

        tracing::info!(
            processed = summary.processed,
            duplicates = summary.duplicates,
            rejected = summary.rejected(),
            partitions = summary.partitions,
            cancelled = summary.cancelled,
            "Dedup run complete"
        );
        Ok(summary)
    }

    fn handle_rejection(&self, error: Error, summary: &mut RunSummary) -> Result<()> {
        match self.options.on_rejected {
            RejectPolicy::Fail => Err(error),
            RejectPolicy::Skip => {
                tracing::warn!(error = %error, kind = error.kind(), "Skipping event");
                summary.note_error(&error);
                Ok(())
            },
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn report(&self, progress: &RunProgress) {
        if let Some(ref cb) = self.progress {
            cb(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::traits::{SourceRecord, VecSource};
    use crate::models::{ClassificationResult, Event};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    fn at(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, m, 0).unwrap()
    }

    /// Scorer that breaks the 0-100 contract.
    #[derive(Clone)]
    struct NanScorer;

    impl SimilarityScorer for NanScorer {
        fn name(&self) -> &'static str {
            "nan"
        }

        fn score_prepared(&self, _a: &str, _b: &str) -> f64 {
            f64::NAN
        }
    }

    /// Two events per partition so the second one has a candidate to score.
    fn scored_source() -> VecSource {
        VecSource::from_events([
            Event::new("1", at(0), "disk full"),
            Event::new("2", at(1), "disk full"),
            Event::new("3", at(2), "disk full"),
        ])
    }

    fn bad_row() -> Error {
        Error::InvalidEvent {
            event_id: "row 1".to_string(),
            reason: "bad timestamp".to_string(),
        }
    }

    #[test]
    fn test_run_options_defaults() {
        let options = RunOptions::default();
        assert_eq!(options.on_rejected, RejectPolicy::Skip);
        assert!(!options.sort);
    }

    #[test]
    fn test_reject_policy_parse() {
        assert_eq!("FAIL".parse::<RejectPolicy>().unwrap(), RejectPolicy::Fail);
        assert_eq!("skip".parse::<RejectPolicy>().unwrap(), RejectPolicy::Skip);
        assert!("maybe".parse::<RejectPolicy>().is_err());
    }

    #[test]
    fn test_run_writes_results_and_novel_events() {
        let mut source = VecSource::from_events([
            Event::new("1", at(0), "disk full on host1"),
            Event::new("2", at(5), "disk full on host1"),
            Event::new("3", at(6), "memory leak in worker"),
        ]);
        let mut results: Vec<ClassificationResult> = Vec::new();
        let mut novel: Vec<Event> = Vec::new();

        let summary = DedupRunner::new(RunOptions::default())
            .run(&mut source, &mut results, Some(&mut novel))
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.novel, 2);
        let novel_ids: Vec<_> = novel.iter().map(|e| e.id.to_string()).collect();
        assert_eq!(novel_ids, vec!["1", "3"]);
    }

    #[test]
    fn test_skip_policy_counts_rejections() {
        let mut source = VecSource::from_results([
            Ok(SourceRecord::new(Event::new("1", at(10), "x"))),
            Err(bad_row()),
            Ok(SourceRecord::new(Event::new("2", at(9), "y"))),
            Ok(SourceRecord::new(Event::new("3", at(11), ""))),
        ]);
        let mut results: Vec<ClassificationResult> = Vec::new();

        let summary = DedupRunner::new(RunOptions::default())
            .run(&mut source, &mut results, None)
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(summary.rejected_out_of_order, 1);
        assert_eq!(summary.rejected_invalid, 2);
        assert_eq!(summary.rejected(), 3);
        assert_eq!(summary.errors.len(), 3);
    }

    #[test]
    fn test_fail_policy_stops_run() {
        let mut source = VecSource::from_results([
            Ok(SourceRecord::new(Event::new("1", at(10), "x"))),
            Ok(SourceRecord::new(Event::new("2", at(9), "y"))),
            Ok(SourceRecord::new(Event::new("3", at(11), "z"))),
        ]);
        let mut results: Vec<ClassificationResult> = Vec::new();

        let options = RunOptions::default().with_on_rejected(RejectPolicy::Fail);
        let err = DedupRunner::new(options)
            .run(&mut source, &mut results, None)
            .unwrap_err();

        assert!(matches!(err, Error::OutOfOrderInput { .. }));
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_scorer_failure_skipped() {
        let mut source = scored_source();
        let mut results: Vec<ClassificationResult> = Vec::new();

        let summary = DedupRunner::new(RunOptions::default())
            .with_scorer(NanScorer)
            .run(&mut source, &mut results, None)
            .unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.event_id.to_string()).collect();
        assert_eq!(ids, vec!["1"]);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.scorer_failures, 2);
        assert_eq!(summary.rejected(), 2);
        assert_eq!(summary.errors.len(), 2);
    }

    #[test]
    fn test_scorer_failure_fails_run() {
        let mut source = scored_source();
        let mut results: Vec<ClassificationResult> = Vec::new();

        let options = RunOptions::default().with_on_rejected(RejectPolicy::Fail);
        let err = DedupRunner::new(options)
            .with_scorer(NanScorer)
            .run(&mut source, &mut results, None)
            .unwrap_err();

        assert!(matches!(err, Error::ScorerFailure { .. }));
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_rejected_first_event_of_partition_counted() {
        let mut source = VecSource::from_results([
            Ok(SourceRecord::new(Event::new("1", at(0), "x")).with_partition("a")),
            Ok(SourceRecord::new(Event::new("2", at(1), " ")).with_partition("b")),
        ]);
        let mut results: Vec<ClassificationResult> = Vec::new();

        let summary = DedupRunner::new(RunOptions::default())
            .run(&mut source, &mut results, None)
            .unwrap();

        assert_eq!(summary.partitions, 1);
        assert_eq!(summary.rejected_invalid, 1);
    }

    #[test]
    fn test_sort_option_reorders_input() {
        let mut source = VecSource::from_events([
            Event::new("1", at(10), "x"),
            Event::new("2", at(9), "y"),
        ]);
        let mut results: Vec<ClassificationResult> = Vec::new();

        let summary = DedupRunner::new(RunOptions::default().with_sort(true))
            .run(&mut source, &mut results, None)
            .unwrap();

        assert_eq!(summary.rejected(), 0);
        assert_eq!(results[0].event_id.as_str(), "2");
    }

    #[test]
    fn test_partitions_counted() {
        let mut source = VecSource::from_results([
            Ok(SourceRecord::new(Event::new("1", at(0), "x")).with_partition("a")),
            Ok(SourceRecord::new(Event::new("2", at(0), "x")).with_partition("b")),
        ]);
        let mut results: Vec<ClassificationResult> = Vec::new();

        let summary = DedupRunner::new(RunOptions::default())
            .run(&mut source, &mut results, None)
            .unwrap();

        assert_eq!(summary.partitions, 2);
        assert_eq!(summary.duplicates, 0);
    }

    #[test]
    fn test_cancellation_stops_before_next_event() {
        let flag = Arc::new(AtomicBool::new(false));
        let trigger = Arc::clone(&flag);
        let mut source = VecSource::from_events((0..10).map(|i| {
            Event::new(i.to_string(), at(i), format!("event {i}"))
        }));
        let mut results: Vec<ClassificationResult> = Vec::new();

        let runner = DedupRunner::new(RunOptions::default())
            .with_cancel_flag(flag)
            .with_progress(Box::new(move |p| {
                if p.read == 3 {
                    trigger.store(true, Ordering::SeqCst);
                }
            }));
        let summary = runner.run(&mut source, &mut results, None).unwrap();

        assert!(summary.cancelled);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_progress_reported() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut source = VecSource::from_events([
            Event::new("1", at(0), "a"),
            Event::new("2", at(1), "b"),
        ]);
        let mut results: Vec<ClassificationResult> = Vec::new();

        DedupRunner::new(RunOptions::default())
            .with_progress(Box::new(move |p| sink.lock().unwrap().push(p.read)))
            .run(&mut source, &mut results, None)
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_progress_percent() {
        let progress = RunProgress {
            read: 50,
            total_estimate: Some(100),
            ..RunProgress::default()
        };
        assert_eq!(progress.percent_complete(), Some(50.0));
        assert!(RunProgress::default().percent_complete().is_none());
    }

    #[test]
    fn test_summary_ratio() {
        let summary = RunSummary {
            processed: 4,
            duplicates: 1,
            ..RunSummary::default()
        };
        assert!((summary.duplicate_ratio() - 0.25).abs() < f64::EPSILON);
        assert!(RunSummary::default().duplicate_ratio().abs() < f64::EPSILON);
    }
}
