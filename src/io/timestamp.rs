//! Timestamp parsing shared by the format adapters.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{Error, Result};

/// Naive layouts tried in order; naive values are taken as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Parses a timestamp cell.
///
/// Accepted forms:
///
/// | Form | Example |
/// |------|---------|
/// | RFC 3339 | `2024-05-01T10:00:00Z`, `2024-05-01T12:00:00+02:00` |
/// | Offset with space | `2024-05-01 10:00:00+00:00` |
/// | Naive (UTC) | `2024-05-01 10:00:00`, `2024-05-01T10:00:00.250` |
/// | Date only (midnight UTC) | `2024-05-01` |
/// | Epoch seconds | `1714557600`, `1714557600.5` |
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if no form matches.
///
/// ```rust
/// use alertdedup::io::parse_timestamp;
///
/// let a = parse_timestamp("2024-05-01T10:00:00Z")?;
/// let b = parse_timestamp("1714557600")?;
/// assert_eq!(a, b);
/// # Ok::<(), alertdedup::Error>(())
/// ```
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput("empty timestamp".to_string()));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    if let Ok(secs) = value.parse::<i64>() {
        return from_epoch_seconds(secs, 0).ok_or_else(|| out_of_range(value));
    }
    if let Ok(secs) = value.parse::<f64>() {
        return from_epoch_f64(secs).ok_or_else(|| out_of_range(value));
    }

    Err(Error::InvalidInput(format!("unrecognized timestamp: {value}")))
}

/// Converts fractional epoch seconds to a UTC timestamp.
///
/// Returns `None` for non-finite or out-of-range values.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn from_epoch_f64(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs.abs() > 1e15 {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    from_epoch_seconds(whole as i64, nanos)
}

fn from_epoch_seconds(secs: i64, nanos: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, nanos)
}

fn out_of_range(value: &str) -> Error {
    Error::InvalidInput(format!("timestamp out of range: {value}"))
}
