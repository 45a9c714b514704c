//! Prometheus metrics.
//!
//! The recorder is process-global. Batch runs are short-lived, so instead of
//! serving a scrape endpoint the rendered exposition text is written to a
//! file at shutdown, where a node-exporter textfile collector can pick it up.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::path::{Path, PathBuf};

/// Metrics configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Where to write the exposition text at shutdown.
    pub output: Option<PathBuf>,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        let enabled = settings.and_then(|config| config.enabled).unwrap_or(false);
        let output = settings
            .and_then(|config| config.output.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let mut config = Self { enabled, output };

        if let Some(enabled) = parse_bool_env("ALERTDEDUP_METRICS_ENABLED") {
            config.enabled = enabled;
        }
        if let Some(output) = parse_string_env("ALERTDEDUP_METRICS_OUTPUT") {
            config.output = Some(PathBuf::from(output));
        }

        config
    }
}

/// Metrics handle for flushing on shutdown.
#[derive(Debug)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    output: Option<PathBuf>,
}

impl MetricsHandle {
    /// Renders the current exposition text.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder as the global recorder.
///
/// Returns `None` when metrics are disabled.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let prometheus = recorder.handle();
    set_global_recorder(recorder)?;
    describe_metrics();

    Ok(Some(MetricsHandle {
        prometheus,
        output: config.output.clone(),
    }))
}

/// Writes the exposition text to the configured file, if any.
///
/// Failures are logged, not returned.
pub fn flush(handle: &MetricsHandle) {
    let Some(output) = &handle.output else {
        tracing::debug!("No metrics output configured, skipping flush");
        return;
    };

    let mut payload = handle.render();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }

    match write_atomically(output, &payload) {
        Ok(()) => tracing::debug!(
            bytes = payload.len(),
            path = %output.display(),
            "Metrics written"
        ),
        Err(err) => tracing::warn!("Failed to write metrics: {err}"),
    }
}

/// Writes a sibling temp file and renames it into place.
fn write_atomically(path: &Path, payload: &str) -> Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, payload).map_err(|e| Error::OperationFailed {
        operation: "write_metrics".to_string(),
        cause: format!("{}: {e}", tmp.display()),
    })?;
    std::fs::rename(&tmp, path).map_err(|e| Error::OperationFailed {
        operation: "write_metrics".to_string(),
        cause: format!("{}: {e}", path.display()),
    })
}

fn describe_metrics() {
    metrics::describe_counter!(
        "dedup_events_total",
        "Events classified, labeled by outcome (novel or duplicate)"
    );
    metrics::describe_counter!(
        "dedup_rejected_total",
        "Events that produced no classification, labeled by reason"
    );
    metrics::describe_counter!("dedup_evicted_total", "History window entries evicted");
    metrics::describe_gauge!("dedup_window_size", "Entries held by the most recently used window");
    metrics::describe_histogram!("dedup_candidates", "Window entries scored per event");
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}

fn parse_bool_env(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        let value = value.to_lowercase();
        value == "true" || value == "1" || value == "yes"
    })
}

fn parse_string_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
