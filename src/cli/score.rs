//! Score CLI command.

use crate::services::deduplication::{FuzzRatio, SimilarityScorer};

/// Score command handler.
///
/// Compares two messages with the same scorer the pipeline uses.
#[derive(Debug, Clone)]
pub struct ScoreCommand {
    /// First message.
    pub a: String,
    /// Second message.
    pub b: String,
    /// Skip the default text processor.
    pub raw: bool,
}

impl ScoreCommand {
    /// Creates a new score command.
    #[must_use]
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            raw: false,
        }
    }

    /// Compares the raw text instead of the processed text.
    #[must_use]
    pub const fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    /// Returns the similarity score (0-100).
    #[must_use]
    pub fn execute(&self) -> f64 {
        let scorer = FuzzRatio::new(!self.raw);
        let score = scorer.score(&self.a, &self.b);
        tracing::debug!(scorer = scorer.name(), raw = self.raw, score, "Scored messages");
        score
    }
}
