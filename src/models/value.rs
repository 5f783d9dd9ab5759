//! Typed cell values and column types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Declared semantic type of a schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Integer,
    /// UTF-8 text.
    Text,
}

impl ColumnType {
    /// Returns the type name used in `DECLARE` manifests.
    #[must_use]
    pub const fn declare_name(self) -> &'static str {
        match self {
            Self::Integer => "Int64",
            Self::Text => "Utf8",
        }
    }

    /// Converts a value to this column type, if the conversion is lossless.
    ///
    /// Returns `None` when the value does not fit. Text only converts to an
    /// integer when it parses exactly; nothing is trimmed or truncated.
    #[must_use]
    pub fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::Integer, Value::Integer(i)) => Some(Value::Integer(*i)),
            (Self::Integer, Value::Text(s)) => s.parse::<i64>().ok().map(Value::Integer),
            (Self::Integer, Value::Timestamp(_)) => None,
            (Self::Text, Value::Text(s)) => Some(Value::Text(s.clone())),
            (Self::Text, Value::Integer(i)) => Some(Value::Text(i.to_string())),
            (Self::Text, Value::Timestamp(t)) => Some(Value::Text(format_timestamp(t))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.declare_name())
    }
}

/// A single cell value.
///
/// Rows and filters carry these instead of untyped strings so that a value
/// which does not fit its column is rejected when the statement is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Integer value.
    Integer(i64),
    /// Text value.
    Text(String),
    /// Point in time; stored as RFC 3339 text.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Returns the integer, if this is an integer value.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the text, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Formats a timestamp the way text columns store it.
///
/// Fixed-width UTC with microseconds, so stored values sort chronologically
/// as plain strings.
#[must_use]
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a timestamp previously written by [`format_timestamp`].
///
/// Any RFC 3339 offset is accepted and normalised to UTC.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(t) => f.write_str(&format_timestamp(t)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Timestamp(t) => serializer.serialize_str(&format_timestamp(t)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test_case(Value::Integer(42), Some(Value::Integer(42)); "integer stays integer")]
    #[test_case(Value::from("42"), Some(Value::Integer(42)); "numeric text parses")]
    #[test_case(Value::from("-7"), Some(Value::Integer(-7)); "negative text parses")]
    #[test_case(Value::from(" 42"), None; "padded text is rejected")]
    #[test_case(Value::from("4.2"), None; "fraction is rejected")]
    #[test_case(Value::from("\"; DROP TABLE users; --\""), None; "payload is rejected")]
    #[test_case(Value::from("99999999999999999999"), None; "overflow is rejected")]
    fn test_coerce_integer(input: Value, expected: Option<Value>) {
        assert_eq!(ColumnType::Integer.coerce(&input), expected);
    }

    #[test]
    fn test_coerce_integer_rejects_timestamp() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(ColumnType::Integer.coerce(&Value::Timestamp(ts)), None);
    }

    #[test]
    fn test_coerce_text() {
        assert_eq!(
            ColumnType::Text.coerce(&Value::from("кофе")),
            Some(Value::from("кофе"))
        );
        assert_eq!(
            ColumnType::Text.coerce(&Value::Integer(300)),
            Some(Value::from("300"))
        );

        let ts = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(
            ColumnType::Text.coerce(&Value::Timestamp(ts)),
            Some(Value::from("2026-10-18T09:30:00.000000Z"))
        );
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)), Some(ts));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 9, 30, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&vec![Value::Integer(1), Value::from("a")]).unwrap();
        assert_eq!(json, "[1,\"a\"]");
    }
}
