//! Serde helpers shared by the record models.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Current time in the format written to new records.
pub fn now() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize a stored timestamp into RFC 3339 with millisecond precision.
///
/// Accepts RFC 3339 strings, epoch milliseconds, and `{seconds, nanoseconds}`
/// objects (with or without leading underscores). Strings that do not parse
/// are passed through unchanged.
pub fn normalize_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|at| format_timestamp(at.with_timezone(&Utc)))
                .unwrap_or_else(|_| raw.clone()),
        ),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(format_timestamp),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, nanos.min(999_999_999) as u32).map(format_timestamp)
        }
        _ => None,
    }
}

/// `deserialize_with` target for optional timestamp fields.
pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(normalize_timestamp))
}

/// `deserialize_with` target treating `null` like a missing field.
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
