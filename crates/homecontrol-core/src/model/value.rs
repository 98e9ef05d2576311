// Lenient JSON coercions. The gateway is not consistent about numbers
// versus numeric strings or booleans versus 0/1.

use chrono::{DateTime, Utc};
use serde_json::Value;

pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(truncate)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

pub(crate) fn as_u8(value: &Value) -> Option<u8> {
    as_i64(value).and_then(|n| u8::try_from(n).ok())
}

pub(crate) fn as_u32(value: &Value) -> Option<u32> {
    as_i64(value).and_then(|n| u32::try_from(n).ok())
}

pub(crate) fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(_) => as_i64(value).map(|n| n != 0),
        Value::String(s) => match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Anything non-empty and non-zero.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => as_f64(value).is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub(crate) fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn as_string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(as_string).collect())
}

/// Milliseconds since the epoch. Negative values mean "never".
pub(crate) fn as_timestamp_ms(value: &Value) -> Option<DateTime<Utc>> {
    as_i64(value)
        .filter(|ms| *ms >= 0)
        .and_then(DateTime::from_timestamp_millis)
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn truncate(n: f64) -> i64 {
    n as i64
}
