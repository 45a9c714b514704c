//! Fuzzy text similarity.
//!
//! Scores are on a 0-100 scale system-wide: thresholds, classification
//! records and CLI output all use it.

/// Highest possible similarity score.
pub const MAX_SCORE: f64 = 100.0;

/// Computes a normalized similarity between two messages.
///
/// Implementations must be pure and symmetric, return values within
/// `0.0..=100.0`, and give identical inputs the maximum score. The classifier
/// treats any other output as a [`crate::Error::ScorerFailure`].
///
/// Scoring is split in two steps so the pipeline can prepare each message
/// once when it enters the window instead of once per comparison.
pub trait SimilarityScorer: Send + Sync {
    /// Scorer name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Converts a raw message into the form compared by [`Self::score_prepared`].
    fn prepare(&self, message: &str) -> String {
        message.to_string()
    }

    /// Scores two already prepared messages.
    fn score_prepared(&self, a: &str, b: &str) -> f64;

    /// Scores two raw messages.
    fn score(&self, a: &str, b: &str) -> f64 {
        self.score_prepared(&self.prepare(a), &self.prepare(b))
    }
}

/// Indel-distance ratio scorer.
///
/// The score is `100 * 2 * LCS(a, b) / (len(a) + len(b))` over Unicode scalar
/// values, rounded to the nearest whole number with ties going to the even
/// neighbour, so a ratio of 92.5 scores 92. This is one minus the
/// insert/delete edit distance divided by the combined length, so a
/// substitution costs two edits.
///
/// # Example
///
/// ```rust
/// use alertdedup::services::deduplication::{FuzzRatio, SimilarityScorer};
///
/// let scorer = FuzzRatio::default();
/// assert_eq!(scorer.score("disk full on host1", "Disk full on host1!"), 100.0);
/// assert!(scorer.score("disk full", "memory leak") < 50.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FuzzRatio {
    normalize: bool,
}

impl FuzzRatio {
    /// Creates a scorer; `normalize` enables [`default_process`].
    #[must_use]
    pub const fn new(normalize: bool) -> Self {
        Self { normalize }
    }
}

impl Default for FuzzRatio {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SimilarityScorer for FuzzRatio {
    fn name(&self) -> &'static str {
        "fuzz_ratio"
    }

    fn prepare(&self, message: &str) -> String {
        if !self.normalize {
            return message.to_string();
        }
        let processed = default_process(message);
        // Punctuation-only messages would all collapse to the empty string.
        if processed.is_empty() {
            message.trim().to_lowercase()
        } else {
            processed
        }
    }

    fn score_prepared(&self, a: &str, b: &str) -> f64 {
        (indel_ratio(a, b) * MAX_SCORE).round_ties_even()
    }
}

/// Default text processor applied before scoring.
///
/// Every character that is neither alphanumeric nor `_` becomes a space, the
/// result is lowercased and trimmed. Inner whitespace runs are kept as is.
///
/// ```rust
/// use alertdedup::services::deduplication::default_process;
///
/// assert_eq!(default_process("  Disk FULL: /var (98%)! "), "disk full   var  98");
/// ```
#[must_use]
pub fn default_process(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();
    replaced.to_lowercase().trim().to_string()
}

/// Indel similarity ratio in `0.0..=1.0`.
///
/// Two empty strings are identical and score 1.0; one empty string against a
/// non-empty one scores 0.0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let lcs = lcs_len(&a, &b);
    (2 * lcs) as f64 / total as f64
}

/// Length of the longest common subsequence, in O(min(m, n)) memory.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    let mut prev = vec![0_usize; short.len() + 1];
    let mut curr = vec![0_usize; short.len() + 1];

    for &lc in long {
        for (j, &sc) in short.iter().enumerate() {
            curr[j + 1] = if lc == sc {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_identical_strings_score_max() {
        let scorer = FuzzRatio::default();
        assert_eq!(scorer.score("disk full on host1", "disk full on host1"), 100.0);
    }

    #[test]
    fn test_disjoint_strings_score_zero() {
        let scorer = FuzzRatio::new(false);
        assert_eq!(scorer.score("aaaa", "zzzz"), 0.0);
    }

    #[test]
    fn test_unequal_lengths() {
        // LCS("abc", "abcdef") = 3 -> 2*3/9
        let scorer = FuzzRatio::new(false);
        assert_eq!(scorer.score("abc", "abcdef"), 67.0);
    }

    #[test_case(37, 92.0; "92.5 rounds down")]
    #[test_case(21, 88.0; "87.5 rounds up")]
    fn test_half_point_ratio_rounds_to_even(shared: usize, expected: f64) {
        // LCS = shared over a combined length of 2 * (shared + 3)
        let a = format!("{}bbb", "a".repeat(shared));
        let b = format!("{}ccc", "a".repeat(shared));
        assert_eq!(FuzzRatio::new(false).score(&a, &b), expected);
    }

    #[test]
    fn test_known_ratio() {
        // LCS = 4 ("hllo"): 2*4/(5+4) = 0.888...
        let ratio = indel_ratio("hello", "hllo");
        assert!((ratio - 8.0 / 9.0).abs() < 1e-12);
    }

    #[test_case("disk full on host1", "disk full on host2")]
    #[test_case("cpu spike", "CPU spike detected")]
    #[test_case("ünïcödé", "unicode")]
    #[test_case("a", "")]
    fn test_symmetric(a: &str, b: &str) {
        let scorer = FuzzRatio::default();
        assert_eq!(scorer.score(a, b), scorer.score(b, a));
    }

    #[test]
    fn test_normalization_ignores_case_and_punctuation() {
        let scorer = FuzzRatio::default();
        assert_eq!(scorer.score("Disk full!", "disk full"), 100.0);

        let raw = FuzzRatio::new(false);
        assert!(raw.score("Disk full!", "disk full") < 100.0);
    }

    #[test]
    fn test_punctuation_only_messages_still_compare() {
        let scorer = FuzzRatio::default();
        assert_eq!(scorer.prepare("!!!"), "!!!");
        assert_eq!(scorer.score("!!!", "!!!"), 100.0);
        assert_eq!(scorer.score("!!!", "disk"), 0.0);
    }

    #[test]
    fn test_empty_inputs() {
        assert!((indel_ratio("", "") - 1.0).abs() < f64::EPSILON);
        assert!(indel_ratio("", "x").abs() < f64::EPSILON);
    }

    #[test]
    fn test_multibyte_chars_counted_once() {
        // Byte-level comparison would see different lengths here.
        assert!((indel_ratio("é", "é") - 1.0).abs() < f64::EPSILON);
        assert!((indel_ratio("日本", "日") - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_default_process_keeps_underscore() {
        assert_eq!(default_process("svc_api: DOWN"), "svc_api  down");
    }
}
