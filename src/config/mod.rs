//! Configuration management.
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! `ALERTDEDUP_*` environment variables. CLI flags are applied last by the
//! binary.
//!
//! ```toml
//! [dedup]
//! window_horizon = "1h"
//! min_similarity_threshold = 95
//! min_match_count = 1
//! reset_policy = "never"
//!
//! [input]
//! message_field = "summary"
//! partition_field = "host"
//! sort = false
//!
//! [run]
//! on_rejected = "skip"
//!
//! [observability.logging]
//! format = "json"
//!
//! [observability.metrics]
//! enabled = true
//! output = "/var/lib/node_exporter/alertdedup.prom"
//! ```

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::io::{RejectPolicy, RunOptions, SourceOptions};
use crate::services::deduplication::{DeduplicationConfig, parse_duration};
use crate::{Error, Result};

/// Name of the config file looked up in the platform config dir.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Main configuration for alertdedup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    /// Engine parameters.
    pub dedup: DeduplicationConfig,
    /// Column mapping for event sources.
    pub input: SourceOptions,
    /// Sort input by timestamp before streaming.
    pub sort: bool,
    /// Rejection handling.
    pub on_rejected: RejectPolicy,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
    /// File the configuration was loaded from, if any.
    pub source: Option<PathBuf>,
}

/// Observability section in config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    /// Logging settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSettings>,
    /// Metrics settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSettings>,
}

/// Logging section in config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Filter directive, e.g. `info` or `alertdedup=debug`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Append logs to this file instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Metrics section in config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Whether metrics are recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Prometheus textfile written at shutdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Engine parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup: Option<ConfigFileDedup>,
    /// Input settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<ConfigFileInput>,
    /// Run settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<ConfigFileRun>,
    /// Observability settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilitySettings>,
}

/// Dedup section in config file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFileDedup {
    /// Look-back horizon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_horizon: Option<DurationValue>,
    /// Minimum similarity (0-100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_similarity_threshold: Option<f64>,
    /// Qualifying matches needed for a duplicate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_match_count: Option<usize>,
    /// Apply the default text processor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
    /// Score candidates in parallel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_scoring: Option<bool>,
    /// Parallel scoring cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_min_candidates: Option<usize>,
    /// `never` or `daily`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_policy: Option<String>,
}

/// Input section in config file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFileInput {
    /// Id column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
    /// Timestamp column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_field: Option<String>,
    /// Message column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_field: Option<String>,
    /// Partition column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_field: Option<String>,
    /// Sort input by timestamp before streaming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<bool>,
}

/// Run section in config file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFileRun {
    /// `skip` or `fail`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_rejected: Option<RejectPolicy>,
}

/// A duration given either as whole seconds or as a humane string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    /// Whole seconds.
    Seconds(i64),
    /// `90s`, `30m`, `1h`, `2d` and so on.
    Humane(String),
}

impl DurationValue {
    /// Converts to a [`TimeDelta`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the value cannot be parsed.
    pub fn to_time_delta(&self) -> Result<TimeDelta> {
        match self {
            Self::Seconds(secs) => TimeDelta::try_seconds(*secs)
                .ok_or_else(|| Error::InvalidInput(format!("duration out of range: {secs}s"))),
            Self::Humane(text) => parse_duration(text),
        }
    }
}

impl AppConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from `path`, or from the default location when
    /// `path` is `None`, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed,
    /// or if the resulting engine parameters are out of range.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default()?,
        };
        let config = config.with_env_overrides()?;
        config.dedup.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let mut config = Self::from_toml(&contents).map_err(|e| match e {
            Error::OperationFailed { operation, cause } => Error::OperationFailed {
                operation,
                cause: format!("{}: {cause}", path.display()),
            },
            other => other,
        })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for [`ConfigFile`] or a
    /// value cannot be interpreted.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_config_file(file)
    }

    /// Loads configuration from the platform config dir
    /// (`~/.config/alertdedup/config.toml` on Linux).
    ///
    /// Returns default configuration if no config file is found.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Converts a `ConfigFile` to `AppConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dedup) = file.dedup {
            if let Some(horizon) = dedup.window_horizon {
                config.dedup.window_horizon = horizon.to_time_delta()?;
            }
            if let Some(threshold) = dedup.min_similarity_threshold {
                config.dedup.min_similarity_threshold = threshold;
            }
            if let Some(count) = dedup.min_match_count {
                config.dedup.min_match_count = count;
            }
            if let Some(normalize) = dedup.normalize {
                config.dedup.normalize = normalize;
            }
            if let Some(parallel) = dedup.parallel_scoring {
                config.dedup.parallel_scoring = parallel;
            }
            if let Some(count) = dedup.parallel_min_candidates {
                config.dedup.parallel_min_candidates = count;
            }
            if let Some(policy) = dedup.reset_policy {
                config.dedup.reset_policy = policy.parse()?;
            }
        }
        if let Some(input) = file.input {
            config.input = SourceOptions {
                id_field: input.id_field,
                timestamp_field: input.timestamp_field,
                message_field: input.message_field,
                partition_field: input.partition_field,
            };
            config.sort = input.sort.unwrap_or(false);
        }
        if let Some(on_rejected) = file.run.and_then(|run| run.on_rejected) {
            config.on_rejected = on_rejected;
        }
        if let Some(observability) = file.observability {
            config.observability = observability;
        }

        Ok(config)
    }

    /// Applies `ALERTDEDUP_*` environment overrides.
    ///
    /// Engine variables are documented on [`DeduplicationConfig`]. This adds
    /// `ALERTDEDUP_ON_REJECTED`, `ALERTDEDUP_SORT` and
    /// `ALERTDEDUP_PARTITION_BY`.
    ///
    /// # Errors
    ///
    /// Returns an error if `ALERTDEDUP_ON_REJECTED` holds an unknown policy.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        self.dedup = self.dedup.with_env_overrides();

        if let Some(policy) = env_string("ALERTDEDUP_ON_REJECTED") {
            self.on_rejected = policy.parse()?;
        }
        if let Some(sort) = env_string("ALERTDEDUP_SORT") {
            self.sort = parse_bool(&sort);
        }
        if let Some(column) = env_string("ALERTDEDUP_PARTITION_BY") {
            self.input.partition_field = Some(column);
        }

        Ok(self)
    }

    /// Builds runner options from this configuration.
    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions::new(self.dedup.clone())
            .with_on_rejected(self.on_rejected)
            .with_sort(self.sort)
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        let file = ConfigFile {
            dedup: Some(ConfigFileDedup {
                window_horizon: Some(DurationValue::Humane(format_duration(
                    self.dedup.window_horizon,
                ))),
                min_similarity_threshold: Some(self.dedup.min_similarity_threshold),
                min_match_count: Some(self.dedup.min_match_count),
                normalize: Some(self.dedup.normalize),
                parallel_scoring: Some(self.dedup.parallel_scoring),
                parallel_min_candidates: Some(self.dedup.parallel_min_candidates),
                reset_policy: Some(self.dedup.reset_policy.as_str().to_string()),
            }),
            input: Some(ConfigFileInput {
                id_field: self.input.id_field.clone(),
                timestamp_field: self.input.timestamp_field.clone(),
                message_field: self.input.message_field.clone(),
                partition_field: self.input.partition_field.clone(),
                sort: Some(self.sort),
            }),
            run: Some(ConfigFileRun {
                on_rejected: Some(self.on_rejected),
            }),
            observability: Some(self.observability.clone()),
        };

        toml::to_string_pretty(&file).map_err(|e| Error::OperationFailed {
            operation: "render_config".to_string(),
            cause: e.to_string(),
        })
    }
}

/// Returns the default config file path, if a home directory is known.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| {
        dirs.config_dir()
            .join(env!("CARGO_PKG_NAME"))
            .join(CONFIG_FILE_NAME)
    })
}

/// Formats a duration with the largest unit that divides it evenly.
#[must_use]
pub fn format_duration(duration: TimeDelta) -> String {
    let secs = duration.num_seconds();
    let units = [(604_800, "w"), (86_400, "d"), (3600, "h"), (60, "m")];
    units
        .iter()
        .find(|(size, _)| secs != 0 && secs % size == 0)
        .map_or_else(
            || format!("{secs}s"),
            |(size, suffix)| format!("{}{suffix}", secs / size),
        )
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == "true" || value == "1" || value == "yes"
}
