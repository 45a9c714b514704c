//! Per-stream dedup pipeline.
//!
//! Sequences one event at a time: admit, evict, query, classify, insert.
//! Classification of an event depends on the window state left behind by
//! every earlier event, so a pipeline is strictly sequential.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use super::classifier::DedupClassifier;
use super::config::{DeduplicationConfig, ResetPolicy};
use super::similarity::{FuzzRatio, SimilarityScorer};
use super::window::{HistoryWindow, WindowEntry};
use crate::models::{ClassificationResult, Event};
use crate::{Error, Result};

/// Counters collected over one pipeline's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Events classified (novel + duplicates).
    pub processed: u64,
    /// Events classified as duplicates.
    pub duplicates: u64,
    /// Events classified as novel.
    pub novel: u64,
    /// Events rejected for arriving out of order.
    pub rejected_out_of_order: u64,
    /// Events rejected by validation.
    pub rejected_invalid: u64,
    /// Events dropped because the scorer misbehaved.
    pub scorer_failures: u64,
    /// Window entries removed by horizon eviction.
    pub evicted: u64,
    /// Hard resets applied by the reset policy.
    pub resets: u64,
    /// Largest window length observed.
    pub peak_window_len: usize,
}

impl PipelineStats {
    /// Adds another pipeline's counters into this one.
    pub fn merge(&mut self, other: &Self) {
        self.processed += other.processed;
        self.duplicates += other.duplicates;
        self.novel += other.novel;
        self.rejected_out_of_order += other.rejected_out_of_order;
        self.rejected_invalid += other.rejected_invalid;
        self.scorer_failures += other.scorer_failures;
        self.evicted += other.evicted;
        self.resets += other.resets;
        self.peak_window_len = self.peak_window_len.max(other.peak_window_len);
    }

    /// Total events rejected before classification.
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.rejected_out_of_order + self.rejected_invalid
    }
}

/// Streaming dedup engine for one logical stream.
///
/// Owns its history window exclusively. Construct one per stream or
/// partition; never share a window across streams.
///
/// # Contract
///
/// Events must arrive in non-decreasing timestamp order. An event that
/// violates the order, or fails validation, is rejected with an error and
/// leaves the pipeline untouched; the caller decides whether to continue.
///
/// # Example
///
/// ```rust
/// use alertdedup::services::deduplication::{DeduplicationConfig, StreamPipeline};
/// use alertdedup::models::Event;
/// use chrono::{TimeZone, Utc};
///
/// let mut pipeline = StreamPipeline::new(DeduplicationConfig::default())?;
/// let t = |m| Utc.with_ymd_and_hms(2024, 5, 1, 10, m, 0).unwrap();
///
/// pipeline.process(Event::new("1", t(0), "x"))?;
/// let err = pipeline.process(Event::new("2", t(0) - chrono::TimeDelta::minutes(1), "y"));
/// assert!(err.is_err());
/// # Ok::<(), alertdedup::Error>(())
/// ```
#[derive(Debug)]
pub struct StreamPipeline<S: SimilarityScorer = FuzzRatio> {
    config: DeduplicationConfig,
    window: HistoryWindow,
    classifier: DedupClassifier<S>,
    last_timestamp: Option<DateTime<Utc>>,
    stats: PipelineStats,
}

impl StreamPipeline<FuzzRatio> {
    /// Creates a pipeline using the built-in [`FuzzRatio`] scorer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configuration is invalid.
    pub fn new(config: DeduplicationConfig) -> Result<Self> {
        let scorer = FuzzRatio::new(config.normalize);
        Self::with_scorer(config, scorer)
    }
}

impl<S: SimilarityScorer> StreamPipeline<S> {
    /// Creates a pipeline around a custom scorer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configuration is invalid.
    pub fn with_scorer(config: DeduplicationConfig, scorer: S) -> Result<Self> {
        config.validate()?;
        let classifier = DedupClassifier::new(scorer)
            .with_parallel(config.parallel_scoring, config.parallel_min_candidates);

        Ok(Self {
            config,
            window: HistoryWindow::new(),
            classifier,
            last_timestamp: None,
            stats: PipelineStats::default(),
        })
    }

    /// Classifies one event and adds it to the window.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEvent`] for an empty id or message, or an id still
    ///   held in the window
    /// - [`Error::OutOfOrderInput`] if the event is older than its predecessor
    /// - [`Error::ScorerFailure`] if the scorer breaks its contract
    ///
    /// On the first two the pipeline state is unchanged. On a scorer failure
    /// the stream clock has advanced to the event's timestamp but the event
    /// is neither emitted nor inserted.
    #[instrument(
        skip(self, event),
        fields(
            operation = "dedup_process",
            event_id = %event.id,
            window_len = self.window.len()
        )
    )]
    pub fn process(&mut self, event: Event) -> Result<ClassificationResult> {
        let reset = match self.admit(&event) {
            Ok(reset) => reset,
            Err(e) => {
                self.record_rejection(&e);
                return Err(e);
            },
        };

        let timestamp = event.timestamp;
        let horizon = self.config.window_horizon;
        self.last_timestamp = Some(timestamp);

        if reset {
            tracing::debug!(
                cleared = self.window.len(),
                policy = self.config.reset_policy.as_str(),
                "Resetting history window"
            );
            self.window.clear();
            self.stats.resets += 1;
        }

        let evicted = self.window.evict_older_than(timestamp - horizon);
        if evicted > 0 {
            self.stats.evicted += evicted as u64;
            metrics::counter!("dedup_evicted_total").increment(evicted as u64);
        }

        let prepared = self.classifier.prepare(&event.message);
        let classified = {
            let candidates = self.window.events_within(timestamp, horizon);
            self.classifier.classify_prepared(
                &event,
                &prepared,
                &candidates,
                self.config.min_similarity_threshold,
                self.config.min_match_count,
            )
        };

        let result = match classified {
            Ok(result) => result,
            Err(e) => {
                self.stats.scorer_failures += 1;
                tracing::error!(error = %e, "Classification failed");
                metrics::counter!("dedup_rejected_total", "reason" => e.kind()).increment(1);
                return Err(e);
            },
        };

        let entry = match &result.representative_id {
            Some(root) => WindowEntry::linked(event, root.clone(), prepared),
            None => WindowEntry::root(event, prepared),
        };
        self.window.insert(entry)?;

        self.record_outcome(&result);
        Ok(result)
    }

    /// Ends the stream, releasing the window.
    ///
    /// Returns the final counters.
    pub fn finish(mut self) -> PipelineStats {
        self.stats.peak_window_len = self.window.peak_len();
        self.window.clear();
        tracing::debug!(
            processed = self.stats.processed,
            duplicates = self.stats.duplicates,
            peak_window_len = self.stats.peak_window_len,
            "Pipeline finished"
        );
        self.stats
    }

    /// Returns the history window.
    #[must_use]
    pub const fn window(&self) -> &HistoryWindow {
        &self.window
    }

    /// Returns the counters so far.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            peak_window_len: self.window.peak_len(),
            ..self.stats
        }
    }

    /// Timestamp of the last admitted event.
    #[must_use]
    pub const fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    /// Validates an event without touching state.
    ///
    /// Returns whether the reset policy clears the window for this event.
    fn admit(&self, event: &Event) -> Result<bool> {
        event.validate()?;

        if let Some(previous) = self.last_timestamp {
            if event.timestamp < previous {
                return Err(Error::OutOfOrderInput {
                    event_id: event.id.to_string(),
                    timestamp: event.timestamp.to_rfc3339(),
                    previous: previous.to_rfc3339(),
                });
            }
        }

        let reset = match (self.config.reset_policy, self.last_timestamp) {
            (ResetPolicy::Daily, Some(previous)) => {
                event.timestamp.date_naive() > previous.date_naive()
            },
            _ => false,
        };

        let cutoff = event.timestamp - self.config.window_horizon;
        if !reset && self.window.holds_since(&event.id, cutoff) {
            return Err(Error::InvalidEvent {
                event_id: event.id.to_string(),
                reason: "id already present in the history window".to_string(),
            });
        }

        Ok(reset)
    }

    fn record_rejection(&mut self, error: &Error) {
        match error {
            Error::OutOfOrderInput { .. } => self.stats.rejected_out_of_order += 1,
            _ => self.stats.rejected_invalid += 1,
        }
        tracing::warn!(error = %error, "Event rejected");
        metrics::counter!("dedup_rejected_total", "reason" => error.kind()).increment(1);
    }

    fn record_outcome(&mut self, result: &ClassificationResult) {
        self.stats.processed += 1;
        let outcome = if result.is_duplicate {
            self.stats.duplicates += 1;
            "duplicate"
        } else {
            self.stats.novel += 1;
            "novel"
        };
        metrics::counter!("dedup_events_total", "outcome" => outcome).increment(1);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("dedup_window_size").set(self.window.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventId;
    use chrono::{TimeDelta, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    fn pipeline() -> StreamPipeline {
        StreamPipeline::new(DeduplicationConfig::default()).unwrap()
    }

    /// Scorer returning a fixed value.
    #[derive(Debug)]
    struct Fixed(f64);

    impl SimilarityScorer for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn score_prepared(&self, _a: &str, _b: &str) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DeduplicationConfig::default().with_min_match_count(0);
        assert!(StreamPipeline::new(config).is_err());
    }

    #[test]
    fn test_duplicate_of_recent_event() {
        let mut p = pipeline();
        let first = p.process(Event::new("1", at(10, 0), "disk full on host1")).unwrap();
        let second = p.process(Event::new("2", at(10, 5), "disk full on host1")).unwrap();

        assert!(!first.is_duplicate);
        assert!(second.is_duplicate);
        assert_eq!(second.representative_id, Some(EventId::new("1")));
        assert_eq!(second.similarity_score, Some(100.0));
    }

    #[test]
    fn test_match_outside_horizon_is_novel() {
        let mut p = pipeline();
        p.process(Event::new("1", at(9, 0), "cpu spike")).unwrap();
        let result = p.process(Event::new("2", at(11, 0), "cpu spike")).unwrap();

        assert!(!result.is_duplicate);
        assert_eq!(p.window().len(), 1);
    }

    #[test]
    fn test_out_of_order_leaves_state_unchanged() {
        let mut p = pipeline();
        p.process(Event::new("1", at(10, 0), "x")).unwrap();

        let err = p.process(Event::new("2", at(9, 59), "y")).unwrap_err();
        assert!(matches!(err, Error::OutOfOrderInput { .. }));
        assert_eq!(p.window().len(), 1);
        assert_eq!(p.last_timestamp(), Some(at(10, 0)));
        assert_eq!(p.stats().rejected_out_of_order, 1);
        assert_eq!(p.stats().processed, 1);
    }

    #[test]
    fn test_invalid_event_does_not_halt_stream() {
        let mut p = pipeline();
        assert!(p.process(Event::new("1", at(10, 0), "")).is_err());
        assert!(p.process(Event::new("2", at(10, 1), "disk full")).is_ok());
        assert_eq!(p.stats().rejected_invalid, 1);
    }

    #[test]
    fn test_reused_id_within_horizon_is_rejected() {
        let mut p = pipeline();
        p.process(Event::new("1", at(10, 0), "disk full")).unwrap();
        let err = p.process(Event::new("1", at(10, 5), "disk full")).unwrap_err();
        assert!(matches!(err, Error::InvalidEvent { .. }));

        // Once the original falls out of the horizon the id is free again.
        assert!(p.process(Event::new("1", at(11, 30), "disk full")).is_ok());
    }

    #[test]
    fn test_transitive_flattening() {
        let config = DeduplicationConfig::default().with_threshold(85.0);
        let mut p = StreamPipeline::new(config).unwrap();

        p.process(Event::new("a", at(10, 0), "disk full on host alpha")).unwrap();
        let b = p
            .process(Event::new("b", at(10, 1), "disk full on host alpha beta"))
            .unwrap();
        assert_eq!(b.representative_id, Some(EventId::new("a")));

        // "c" scores 81 against "a" and 90 against "b".
        let scorer = FuzzRatio::default();
        let c_text = "disk full on host alpha beta gamma";
        assert!(scorer.score(c_text, "disk full on host alpha") < 85.0);

        let c = p.process(Event::new("c", at(10, 2), c_text)).unwrap();
        assert!(c.is_duplicate);
        assert_eq!(c.similarity_score, Some(90.0));
        assert_eq!(c.representative_id, Some(EventId::new("a")));
    }

    #[test]
    fn test_scorer_failure_advances_clock_only() {
        let mut p = StreamPipeline::with_scorer(DeduplicationConfig::default(), Fixed(f64::NAN))
            .unwrap();
        p.process(Event::new("1", at(10, 0), "disk full")).unwrap();

        let err = p.process(Event::new("2", at(10, 5), "disk full")).unwrap_err();
        assert!(matches!(err, Error::ScorerFailure { .. }));
        assert_eq!(p.window().len(), 1);
        assert!(!p.window().holds_since(&EventId::new("2"), at(10, 0)));
        assert_eq!(p.last_timestamp(), Some(at(10, 5)));

        let stats = p.stats();
        assert_eq!(stats.scorer_failures, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.rejected(), 0);

        // The clock moved, so an event between the two is now out of order.
        let err = p.process(Event::new("3", at(10, 3), "disk full")).unwrap_err();
        assert!(matches!(err, Error::OutOfOrderInput { .. }));
    }

    #[test]
    fn test_window_bounded_by_horizon() {
        let config = DeduplicationConfig::default().with_window_horizon(TimeDelta::minutes(10));
        let mut p = StreamPipeline::new(config).unwrap();

        for minute in 0..60 {
            p.process(Event::new(
                minute.to_string(),
                at(10, minute),
                format!("event number {minute}"),
            ))
            .unwrap();
            let latest = at(10, minute);
            assert!(
                p.window()
                    .iter_recent_first()
                    .all(|e| e.timestamp() >= latest - TimeDelta::minutes(10))
            );
        }
        assert_eq!(p.window().len(), 11);
        assert_eq!(p.stats().evicted, 49);
    }

    #[test]
    fn test_daily_reset_policy() {
        let config = DeduplicationConfig::default()
            .with_window_horizon(TimeDelta::hours(6))
            .with_reset_policy(ResetPolicy::Daily);
        let mut p = StreamPipeline::new(config).unwrap();

        let late = Utc.with_ymd_and_hms(2024, 5, 1, 23, 50, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 5, 2, 0, 10, 0).unwrap();
        p.process(Event::new("1", late, "nightly backup failed")).unwrap();
        let result = p.process(Event::new("2", early, "nightly backup failed")).unwrap();

        assert!(!result.is_duplicate);
        assert_eq!(p.stats().resets, 1);
    }

    #[test]
    fn test_no_reset_by_default() {
        let mut p = pipeline();
        let late = Utc.with_ymd_and_hms(2024, 5, 1, 23, 50, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 5, 2, 0, 10, 0).unwrap();
        p.process(Event::new("1", late, "nightly backup failed")).unwrap();
        let result = p.process(Event::new("2", early, "nightly backup failed")).unwrap();
        assert!(result.is_duplicate);
    }

    #[test]
    fn test_finish_reports_stats() {
        let mut p = pipeline();
        p.process(Event::new("1", at(10, 0), "disk full")).unwrap();
        p.process(Event::new("2", at(10, 1), "disk full")).unwrap();
        p.process(Event::new("3", at(10, 2), "memory leak")).unwrap();

        let stats = p.finish();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.novel, 2);
        assert_eq!(stats.peak_window_len, 3);
    }

    #[test]
    fn test_stats_merge() {
        let mut a = PipelineStats {
            processed: 2,
            duplicates: 1,
            peak_window_len: 4,
            ..PipelineStats::default()
        };
        let b = PipelineStats {
            processed: 3,
            rejected_invalid: 1,
            peak_window_len: 2,
            ..PipelineStats::default()
        };
        a.merge(&b);
        assert_eq!(a.processed, 5);
        assert_eq!(a.rejected(), 1);
        assert_eq!(a.peak_window_len, 4);
    }
}
