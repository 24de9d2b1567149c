//! Date / date-time coercion for model-supplied values.
//!
//! An unparseable value is treated as absent and logged; it never aborts
//! the mapping of the surrounding entity.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Parse an ISO 8601 timestamp into an instant.
///
/// Accepts RFC 3339 (`Z` or numeric offset), offset-less timestamps (read as
/// UTC) and bare dates (midnight UTC).
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }
    parse_date(trimmed)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical string form used for timestamps stored as text inside JSON
/// shapes (encounter period, processing-time stamps).
pub fn to_canonical(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Text of a JSON value that should hold a date, or `None` when absent.
/// Empty strings and the literal "null" count as absent.
fn date_text<'a>(field: &str, value: Option<&'a Value>) -> Option<&'a str> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(trimmed)
            }
        }
        Some(other) => {
            tracing::warn!(field, kind = json_kind(other), "Date field is not a string, ignoring");
            None
        }
    }
}

/// Coerce an optional JSON value to a calendar date, logging failures.
pub fn coerce_date(field: &str, value: Option<&Value>) -> Option<NaiveDate> {
    let text = date_text(field, value)?;
    let parsed = parse_date(text);
    if parsed.is_none() {
        tracing::warn!(field, "Unparseable date, treating as absent");
    }
    parsed
}

/// Coerce an optional JSON value to an instant, logging failures.
pub fn coerce_datetime(field: &str, value: Option<&Value>) -> Option<DateTime<Utc>> {
    let text = date_text(field, value)?;
    let parsed = parse_datetime(text);
    if parsed.is_none() {
        tracing::warn!(field, "Unparseable timestamp, treating as absent");
    }
    parsed
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
