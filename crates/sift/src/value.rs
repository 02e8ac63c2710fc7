//! Helpers over filter values.
//!
//! Filter values arrive as [`serde_json::Value`]: query strings produce
//! strings, JSON bodies produce anything. The helpers here answer the questions
//! every engine asks of a raw value (is it empty, is it a list, what number
//! does it hold) without committing to a storage representation.

use std::cmp::Ordering;

use serde_json::Value;

/// Returns `true` for values that carry no filter intent.
///
/// Null, blank strings, empty arrays and empty objects are empty. `false` and
/// `0` are real values and are not empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Converts a value into a list of values.
///
/// Arrays are returned as-is, strings are split on commas (each part trimmed,
/// blank parts dropped), anything else becomes a one-element list.
pub fn to_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| Value::String(part.to_string()))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Renders a scalar value as text. Arrays and objects have no text form.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Numeric value extracted from a filter value.
///
/// Numbers are stored in one of three variants to preserve precision:
/// - `I64` for signed integers
/// - `U64` for unsigned integers
/// - `F64` for floating point
///
/// Comparisons between different numeric types convert to `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Signed 64-bit integer.
    I64(i64),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// 64-bit floating point.
    F64(f64),
}

impl Number {
    /// Extracts a number from a JSON number or a numeric string.
    pub fn from_json(value: &Value) -> Option<Number> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Number::I64(i))
                } else if let Some(u) = n.as_u64() {
                    Some(Number::U64(u))
                } else {
                    n.as_f64().map(Number::F64)
                }
            }
            Value::String(s) => Number::parse(s.trim()),
            _ => None,
        }
    }

    /// Parses a number from text.
    pub fn parse(text: &str) -> Option<Number> {
        if text.is_empty() {
            return None;
        }
        if let Ok(i) = text.parse::<i64>() {
            return Some(Number::I64(i));
        }
        if let Ok(u) = text.parse::<u64>() {
            return Some(Number::U64(u));
        }
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Number::F64)
    }

    /// Converts the number to f64 for comparison.
    pub fn to_f64(self) -> f64 {
        match self {
            Number::I64(n) => n as f64,
            Number::U64(n) => n as f64,
            Number::F64(n) => n,
        }
    }

    /// Compares two numbers, handling mixed types.
    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::I64(a), Number::I64(b)) => Some(a.cmp(&b)),
            (Number::U64(a), Number::U64(b)) => Some(a.cmp(&b)),
            (Number::F64(a), Number::F64(b)) => a.partial_cmp(&b),
            _ => self.to_f64().partial_cmp(&other.to_f64()),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(*other)
    }
}

/// Compares two filter values.
///
/// Numbers (and numeric strings) compare numerically, strings
/// lexicographically, booleans as `false < true`. Null sorts after everything.
/// Returns `None` when the two values cannot be ordered against each other.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Greater),
        (_, Value::Null) => Some(Ordering::Less),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (Number::from_json(a), Number::from_json(b)) {
            (Some(a), Some(b)) => a.compare(b),
            _ => match (a, b) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            },
        },
    }
}

/// Loose equality used by the in-memory sink and by `in` checks.
///
/// `"5"` equals `5`, `"true"` equals `true`; everything else uses JSON
/// equality.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Bool(flag), Value::String(s)) | (Value::String(s), Value::Bool(flag)) => {
            s.eq_ignore_ascii_case(if *flag { "true" } else { "false" })
        }
        _ => compare_values(a, b) == Some(Ordering::Equal) && !a.is_null() && !b.is_null(),
    }
}
