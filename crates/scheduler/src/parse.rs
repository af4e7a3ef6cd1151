//! Parsing utilities for durations and absolute timestamps.

use std::time::Duration;

use crate::{Error, Result};

/// Parse a human-friendly duration string into milliseconds.
///
/// Supported suffixes: `ms`, `s` (seconds), `m` (minutes), `h` (hours),
/// `d` (days). Examples: `"500ms"`, `"30s"`, `"5m"`, `"2h"`, `"1d"`.
pub fn parse_duration_ms(input: &str) -> Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::message("empty duration string"));
    }

    let (num_str, suffix) = match input.find(|c: char| c.is_alphabetic()) {
        Some(i) => (&input[..i], &input[i..]),
        None => {
            return Err(Error::message(format!(
                "duration missing unit suffix (ms/s/m/h/d): {input}"
            )));
        },
    };

    let value: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| Error::message(format!("invalid number in duration: {num_str}")))?;

    let unit = match suffix {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => {
            return Err(Error::message(format!(
                "unknown duration suffix: {suffix} (expected ms/s/m/h/d)"
            )));
        },
    };

    value
        .checked_mul(unit)
        .ok_or_else(|| Error::message(format!("duration too large: {input}")))
}

/// [`parse_duration_ms`] as a [`Duration`]. Zero is allowed here: a zero
/// shutdown grace means "cancel immediately".
pub fn parse_duration(input: &str) -> Result<Duration> {
    parse_duration_ms(input).map(Duration::from_millis)
}

/// Parse an ISO 8601 timestamp string into epoch milliseconds.
///
/// Accepts formats like `"2026-01-12T18:00:00Z"` or with a timezone offset.
pub fn parse_absolute_time_ms(input: &str) -> Result<u64> {
    use chrono::{DateTime, Utc};

    let dt: DateTime<Utc> = input
        .trim()
        .parse::<DateTime<Utc>>()
        .map_err(|e| Error::message(format!("invalid ISO 8601 timestamp: {e}")))?;

    u64::try_from(dt.timestamp_millis())
        .map_err(|_| Error::message("timestamp is before epoch"))
}

/// Render epoch milliseconds as RFC 3339 in UTC, or `-` when out of range.
pub fn format_time_ms(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map_or_else(|| "-".to_string(), |dt| dt.to_rfc3339())
}
