//! Repository layer: entity-scoped database operations as free functions
//! over a `rusqlite::Connection`.
//!
//! Timestamps are stored as RFC 3339 UTC text with microseconds, JSON-shaped
//! fields as serialized JSON text.

mod clinical;
mod conversation;
mod encounter;
mod patient;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::DatabaseError;

pub use clinical::*;
pub use conversation::*;
pub use encounter::*;
pub use patient::*;

pub(crate) fn ts_to_sql(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn ts_from_sql(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidTimestamp(value.to_string()))
}

pub(crate) fn opt_ts_from_sql(value: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.as_deref().map(ts_from_sql).transpose()
}

pub(crate) fn date_from_sql(value: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| DatabaseError::InvalidTimestamp(value.to_string()))
}

pub(crate) fn json_to_sql<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::JsonColumn(e.to_string()))
}

pub(crate) fn json_from_sql<T: DeserializeOwned>(value: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(value).map_err(|e| DatabaseError::JsonColumn(e.to_string()))
}

pub(crate) fn uuid_from_sql(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_round_trip_keeps_microseconds() {
        let dt = Utc.timestamp_opt(1_710_493_200, 123_456_000).unwrap();
        let stored = ts_to_sql(&dt);
        assert!(stored.ends_with('Z'));
        assert_eq!(ts_from_sql(&stored).unwrap(), dt);
    }

    #[test]
    fn stored_timestamps_sort_lexicographically() {
        let a = ts_to_sql(&Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
        let b = ts_to_sql(&Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
        assert!(a < b);
    }

    #[test]
    fn bad_values_are_typed_errors() {
        assert!(matches!(ts_from_sql("yesterday"), Err(DatabaseError::InvalidTimestamp(_))));
        assert!(matches!(
            json_from_sql::<serde_json::Value>("{oops"),
            Err(DatabaseError::JsonColumn(_))
        ));
        assert!(matches!(uuid_from_sql("nope"), Err(DatabaseError::ConstraintViolation(_))));
    }
}
