//! Duplicate-or-novel decision rule.
//!
//! Pure function of its inputs: the new event, the candidate window entries,
//! the threshold and the minimum match count. Holds no state besides its
//! scorer and scoring strategy.

use rayon::prelude::*;

use super::similarity::{FuzzRatio, MAX_SCORE, SimilarityScorer};
use super::window::WindowEntry;
use crate::models::{ClassificationResult, Event, EventId};
use crate::{Error, Result};

/// Best qualifying match found for an event.
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    /// Id of the matched window entry.
    pub matched_id: EventId,
    /// Root representative of the matched entry.
    pub root: EventId,
    /// Score against the matched entry.
    pub score: f64,
    /// Number of entries scoring at or above the threshold.
    pub qualifying: usize,
}

/// Classifies events against window contents.
///
/// # Representative selection
///
/// Among entries scoring at or above the threshold the highest score wins.
/// Candidates arrive most-recent-first, and a later candidate only replaces
/// the current best on a strictly higher score, so ties go to the most
/// recently inserted entry. The reported representative is that entry's root,
/// which keeps every duplicate pointing directly at a novel event.
///
/// # Example
///
/// ```rust
/// use alertdedup::services::deduplication::{DedupClassifier, WindowEntry};
/// use alertdedup::models::Event;
/// use chrono::{TimeZone, Utc};
///
/// let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
/// let classifier = DedupClassifier::default();
/// let held = WindowEntry::root(Event::new("1", t, "disk full"), "disk full".into());
///
/// let result = classifier.classify(&Event::new("2", t, "disk full"), &[&held], 95.0, 1)?;
/// assert!(result.is_duplicate);
/// # Ok::<(), alertdedup::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DedupClassifier<S: SimilarityScorer = FuzzRatio> {
    scorer: S,
    parallel: bool,
    parallel_min_candidates: usize,
}

impl Default for DedupClassifier<FuzzRatio> {
    fn default() -> Self {
        Self::new(FuzzRatio::default())
    }
}

impl<S: SimilarityScorer> DedupClassifier<S> {
    /// Creates a sequential classifier around a scorer.
    #[must_use]
    pub const fn new(scorer: S) -> Self {
        Self {
            scorer,
            parallel: false,
            parallel_min_candidates: usize::MAX,
        }
    }

    /// Scores candidates on the rayon pool once there are at least
    /// `min_candidates` of them.
    #[must_use]
    pub const fn with_parallel(mut self, enabled: bool, min_candidates: usize) -> Self {
        self.parallel = enabled;
        self.parallel_min_candidates = min_candidates;
        self
    }

    /// Returns the scorer.
    #[must_use]
    pub const fn scorer(&self) -> &S {
        &self.scorer
    }

    /// Prepares a message with the classifier's scorer.
    #[must_use]
    pub fn prepare(&self, message: &str) -> String {
        self.scorer.prepare(message)
    }

    /// Classifies `event` against `candidates` (most recent first).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScorerFailure`] if the scorer produces a value
    /// outside 0-100.
    pub fn classify(
        &self,
        event: &Event,
        candidates: &[&WindowEntry],
        min_similarity_threshold: f64,
        min_match_count: usize,
    ) -> Result<ClassificationResult> {
        let prepared = self.prepare(&event.message);
        self.classify_prepared(
            event,
            &prepared,
            candidates,
            min_similarity_threshold,
            min_match_count,
        )
    }

    /// Like [`Self::classify`] with the event's message already prepared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScorerFailure`] if the scorer produces a value
    /// outside 0-100.
    pub fn classify_prepared(
        &self,
        event: &Event,
        prepared: &str,
        candidates: &[&WindowEntry],
        min_similarity_threshold: f64,
        min_match_count: usize,
    ) -> Result<ClassificationResult> {
        let best = self.best_match(event, prepared, candidates, min_similarity_threshold)?;

        match best {
            Some(best) if best.qualifying >= min_match_count => {
                tracing::debug!(
                    event_id = %event.id,
                    matched_id = %best.matched_id,
                    representative_id = %best.root,
                    score = best.score,
                    qualifying = best.qualifying,
                    "Duplicate found"
                );
                Ok(ClassificationResult::duplicate(
                    event.id.clone(),
                    best.root,
                    best.score,
                ))
            },
            Some(best) => {
                tracing::debug!(
                    event_id = %event.id,
                    qualifying = best.qualifying,
                    min_match_count,
                    "Too few matches for a duplicate"
                );
                Ok(ClassificationResult::novel(event.id.clone()))
            },
            None => Ok(ClassificationResult::novel(event.id.clone())),
        }
    }

    /// Finds the best match at or above the threshold, if any.
    ///
    /// Entries sharing the event's id are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScorerFailure`] if any score is not a finite value
    /// within 0-100.
    pub fn best_match(
        &self,
        event: &Event,
        prepared: &str,
        candidates: &[&WindowEntry],
        min_similarity_threshold: f64,
    ) -> Result<Option<BestMatch>> {
        let others: Vec<&WindowEntry> = candidates
            .iter()
            .copied()
            .filter(|entry| entry.event.id != event.id)
            .collect();

        let scores = self.score_all(prepared, &others);

        let mut best: Option<(&WindowEntry, f64)> = None;
        let mut qualifying = 0;

        for (entry, score) in others.iter().zip(scores) {
            self.check_score(event, entry, score)?;
            if score < min_similarity_threshold {
                continue;
            }
            qualifying += 1;
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((entry, score));
            }
        }

        metrics::histogram!("dedup_candidates").record(usize_to_f64(others.len()));

        Ok(best.map(|(entry, score)| BestMatch {
            matched_id: entry.event.id.clone(),
            root: entry.root.clone(),
            score,
            qualifying,
        }))
    }

    /// Scores every candidate, preserving candidate order.
    fn score_all(&self, prepared: &str, candidates: &[&WindowEntry]) -> Vec<f64> {
        if self.parallel && candidates.len() >= self.parallel_min_candidates {
            candidates
                .par_iter()
                .map(|entry| self.scorer.score_prepared(prepared, &entry.prepared))
                .collect()
        } else {
            candidates
                .iter()
                .map(|entry| self.scorer.score_prepared(prepared, &entry.prepared))
                .collect()
        }
    }

    fn check_score(&self, event: &Event, entry: &WindowEntry, score: f64) -> Result<()> {
        if score.is_finite() && (0.0..=MAX_SCORE).contains(&score) {
            return Ok(());
        }
        Err(Error::ScorerFailure {
            scorer: self.scorer.name().to_string(),
            cause: format!(
                "score {score} for '{}' vs '{}' is outside 0-100",
                event.id, entry.event.id
            ),
        })
    }
}

#[allow(clippy::cast_precision_loss)]
const fn usize_to_f64(n: usize) -> f64 {
    n as f64
}
