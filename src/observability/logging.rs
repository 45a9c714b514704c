//! Structured logging configuration.

use crate::config::LoggingSettings;
use crate::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Default filter when nothing else is configured.
const DEFAULT_FILTER: &str = "warn";

/// Filter used for `--verbose`.
const VERBOSE_FILTER: &str = "alertdedup=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Returns the format name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" | "human" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!("unknown log format: {other}"))),
        }
    }
}

/// Logging configuration.
///
/// # Environment Variables
///
/// | Variable | Description |
/// |----------|-------------|
/// | `ALERTDEDUP_LOG` | Filter directive, e.g. `alertdedup=debug` (wins over `RUST_LOG`) |
/// | `RUST_LOG` | Filter directive |
/// | `ALERTDEDUP_LOG_FORMAT` | `pretty` or `json` |
/// | `ALERTDEDUP_LOG_FILE` | Append logs to this file instead of stderr |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Optional log file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// Filter precedence: `ALERTDEDUP_LOG`, `RUST_LOG`, `--verbose`, the
    /// configured level, then `warn`.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let mut config = Self::default();

        if let Some(settings) = settings {
            if let Some(format) = settings.format.as_deref().and_then(|f| f.parse().ok()) {
                config.format = format;
            }
            if let Some(level) = settings.level.as_deref().filter(|l| !l.trim().is_empty()) {
                config.filter = level.trim().to_string();
            }
            if let Some(file) = settings.file.as_deref().filter(|f| !f.trim().is_empty()) {
                config.file = Some(PathBuf::from(file));
            }
        }

        if verbose {
            config.filter = VERBOSE_FILTER.to_string();
        }
        if let Some(directive) = env_string("ALERTDEDUP_LOG").or_else(|| env_string("RUST_LOG")) {
            config.filter = directive;
        }
        if let Some(format) = env_string("ALERTDEDUP_LOG_FORMAT").and_then(|f| f.parse().ok()) {
            config.format = format;
        }
        if let Some(file) = env_string("ALERTDEDUP_LOG_FILE") {
            config.file = Some(PathBuf::from(file));
        }

        config
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.as_str(), "json");
    }

    #[test]
    fn test_settings_applied() {
        let settings = LoggingSettings {
            format: Some("json".to_string()),
            level: Some("info".to_string()),
            file: Some("/tmp/alertdedup.log".to_string()),
        };
        let config = LoggingConfig::from_settings(Some(&settings), false);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/alertdedup.log")));
        if std::env::var("ALERTDEDUP_LOG").is_err() && std::env::var("RUST_LOG").is_err() {
            assert_eq!(config.filter, "info");
        }
    }

    #[test]
    fn test_verbose_overrides_configured_level() {
        let settings = LoggingSettings {
            level: Some("error".to_string()),
            ..LoggingSettings::default()
        };
        let config = LoggingConfig::from_settings(Some(&settings), true);
        if std::env::var("ALERTDEDUP_LOG").is_err() && std::env::var("RUST_LOG").is_err() {
            assert_eq!(config.filter, VERBOSE_FILTER);
        }
    }
}
