//! Deduplication configuration.
//!
//! This module defines the run-wide parameters of the dedup engine: the
//! look-back horizon, the similarity threshold and the robustness match count.

use chrono::TimeDelta;
use serde::Deserialize;
use std::str::FromStr;

use crate::{Error, Result};

/// Default look-back horizon (1 hour).
pub const DEFAULT_HORIZON_SECS: i64 = 3600;

/// Default similarity threshold on the 0-100 scale.
pub const DEFAULT_THRESHOLD: f64 = 95.0;

/// When to hard-reset a partition's history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetPolicy {
    /// Only horizon-based eviction bounds the window.
    #[default]
    Never,
    /// Clear the window when an event lands on a later UTC calendar day.
    Daily,
}

impl ResetPolicy {
    /// Returns the policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Daily => "daily",
        }
    }
}

impl FromStr for ResetPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "never" | "none" | "off" => Ok(Self::Never),
            "daily" | "day" => Ok(Self::Daily),
            other => Err(Error::InvalidInput(format!("unknown reset policy: {other}"))),
        }
    }
}

/// Configuration for the dedup engine.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `ALERTDEDUP_HORIZON` | duration | `1h` | Look-back window (`90s`, `30m`, `1h`, `2d` or seconds) |
/// | `ALERTDEDUP_THRESHOLD` | f64 | `95` | Minimum similarity (0-100) |
/// | `ALERTDEDUP_MIN_MATCHES` | usize | `1` | Qualifying matches needed for a duplicate |
/// | `ALERTDEDUP_NORMALIZE` | bool | `true` | Lowercase and strip punctuation before scoring |
/// | `ALERTDEDUP_PARALLEL` | bool | `false` | Score candidates on the rayon pool |
/// | `ALERTDEDUP_RESET_POLICY` | string | `never` | `never` or `daily` |
///
/// # Example
///
/// ```rust
/// use alertdedup::services::deduplication::DeduplicationConfig;
///
/// let config = DeduplicationConfig::default();
/// assert_eq!(config.window_horizon.num_seconds(), 3600);
/// assert_eq!(config.min_similarity_threshold, 95.0);
/// assert_eq!(config.min_match_count, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DeduplicationConfig {
    /// How far back duplicates may be detected.
    pub window_horizon: TimeDelta,

    /// Minimum score (0-100) for a window entry to count as a match.
    pub min_similarity_threshold: f64,

    /// Number of qualifying matches needed to classify as duplicate.
    ///
    /// Guards against a single noisy false match when raised above 1.
    pub min_match_count: usize,

    /// Apply the default text processor before scoring.
    pub normalize: bool,

    /// Score candidates in parallel.
    pub parallel_scoring: bool,

    /// Candidate count below which scoring stays sequential even when
    /// `parallel_scoring` is on.
    pub parallel_min_candidates: usize,

    /// Optional hard reset of the window.
    pub reset_policy: ResetPolicy,
}

impl DeduplicationConfig {
    /// Applies `ALERTDEDUP_*` environment overrides on top of `self`.
    ///
    /// Unset or unparseable variables leave the current value.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(horizon) = std::env::var("ALERTDEDUP_HORIZON")
            .ok()
            .and_then(|v| parse_duration(&v).ok())
        {
            self.window_horizon = horizon;
        }

        if let Some(threshold) = std::env::var("ALERTDEDUP_THRESHOLD")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            self.min_similarity_threshold = threshold;
        }

        if let Some(count) = std::env::var("ALERTDEDUP_MIN_MATCHES")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            self.min_match_count = count;
        }

        if let Ok(v) = std::env::var("ALERTDEDUP_NORMALIZE") {
            self.normalize = parse_bool(&v);
        }

        if let Ok(v) = std::env::var("ALERTDEDUP_PARALLEL") {
            self.parallel_scoring = parse_bool(&v);
        }

        if let Some(policy) = std::env::var("ALERTDEDUP_RESET_POLICY")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.reset_policy = policy;
        }

        self
    }

    /// Checks every parameter is in range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the horizon is not positive, the
    /// threshold is outside 0-100, or `min_match_count` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.window_horizon <= TimeDelta::zero() {
            return Err(Error::InvalidInput(format!(
                "window horizon must be positive, got {}s",
                self.window_horizon.num_seconds()
            )));
        }
        if !self.min_similarity_threshold.is_finite()
            || !(0.0..=100.0).contains(&self.min_similarity_threshold)
        {
            return Err(Error::InvalidInput(format!(
                "similarity threshold must be within 0-100, got {}",
                self.min_similarity_threshold
            )));
        }
        if self.min_match_count == 0 {
            return Err(Error::InvalidInput(
                "min match count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Builder method to set the look-back horizon.
    #[must_use]
    pub const fn with_window_horizon(mut self, horizon: TimeDelta) -> Self {
        self.window_horizon = horizon;
        self
    }

    /// Builder method to set the similarity threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.min_similarity_threshold = threshold;
        self
    }

    /// Builder method to set the minimum match count.
    #[must_use]
    pub const fn with_min_match_count(mut self, count: usize) -> Self {
        self.min_match_count = count;
        self
    }

    /// Builder method to toggle message normalization.
    #[must_use]
    pub const fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Builder method to toggle parallel candidate scoring.
    #[must_use]
    pub const fn with_parallel_scoring(mut self, parallel: bool) -> Self {
        self.parallel_scoring = parallel;
        self
    }

    /// Builder method to set the parallel scoring cutoff.
    #[must_use]
    pub const fn with_parallel_min_candidates(mut self, count: usize) -> Self {
        self.parallel_min_candidates = count;
        self
    }

    /// Builder method to set the reset policy.
    #[must_use]
    pub const fn with_reset_policy(mut self, policy: ResetPolicy) -> Self {
        self.reset_policy = policy;
        self
    }
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            window_horizon: TimeDelta::seconds(DEFAULT_HORIZON_SECS),
            min_similarity_threshold: DEFAULT_THRESHOLD,
            min_match_count: 1,
            normalize: true,
            parallel_scoring: false,
            parallel_min_candidates: 256,
            reset_policy: ResetPolicy::Never,
        }
    }
}

/// Parses a humane duration: `90s`, `30m`, `1h`, `2d`, `1w`, or bare seconds.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for empty strings, unknown units or
/// values that overflow.
///
/// # Example
///
/// ```rust
/// use alertdedup::services::deduplication::parse_duration;
///
/// assert_eq!(parse_duration("1h").unwrap().num_seconds(), 3600);
/// assert_eq!(parse_duration("90").unwrap().num_seconds(), 90);
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<TimeDelta> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let value: i64 = digits
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid duration: '{input}'")))?;

    let multiplier = match unit.trim().to_lowercase().as_str() {
        "" | "s" | "sec" | "secs" => 1,
        "m" | "min" | "mins" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        other => {
            return Err(Error::InvalidInput(format!(
                "unknown duration unit '{other}' in '{input}'"
            )));
        },
    };

    value
        .checked_mul(multiplier)
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| Error::InvalidInput(format!("duration out of range: '{input}'")))
}

fn parse_bool(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == "true" || value == "1" || value == "yes"
}
