//! Payload handed to invokable filter handlers.
//!
//! A [`Payload`] wraps one input entry (field, operator, raw value) and
//! offers the checks and conversions handlers usually need before writing to
//! the sink.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::value::{is_empty_value, scalar_text, to_list, Number};

static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}([ T]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$")
        .expect("date pattern is valid")
});

/// Which side(s) of a value `as_like_with` wraps in `%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LikeSide {
    /// `%value%`
    #[default]
    Both,
    /// `%value`
    Left,
    /// `value%`
    Right,
}

/// One filter entry as seen by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    field: String,
    operator: String,
    value: Value,
    raw: Value,
}

impl Payload {
    /// Creates a payload. The raw value is kept even after `set_value`.
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Payload {
            field: field.into(),
            operator: operator.into(),
            raw: value.clone(),
            value,
        }
    }

    /// The field (filter key) this payload belongs to.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The native operator.
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// The current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The value as it arrived, before any `set_value`.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Replaces the field.
    pub fn set_field(&mut self, field: impl Into<String>) {
        self.field = field.into();
    }

    /// Replaces the operator.
    pub fn set_operator(&mut self, operator: impl Into<String>) {
        self.operator = operator.into();
    }

    /// Replaces the value.
    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    // ========================================================================
    // Checks
    // ========================================================================

    /// Null, blank string, empty array or empty object.
    pub fn is_empty(&self) -> bool {
        is_empty_value(&self.value)
    }

    /// The value is null.
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// A number or a numeric string.
    pub fn is_numeric(&self) -> bool {
        Number::from_json(&self.value).is_some()
    }

    /// A boolean or a boolean-like string (`true`, `false`, `1`, `0`, `yes`,
    /// `no`, `on`, `off`).
    pub fn is_bool(&self) -> bool {
        self.as_bool().is_some()
    }

    /// A string that parses as a JSON array or object.
    pub fn is_json(&self) -> bool {
        self.as_json().is_some_and(|v| v.is_array() || v.is_object())
    }

    /// An array, or a comma-separated string.
    pub fn is_array(&self) -> bool {
        match &self.value {
            Value::Array(_) => true,
            Value::String(s) => s.contains(','),
            _ => false,
        }
    }

    /// An ISO-8601 date or date-time string.
    pub fn is_date(&self) -> bool {
        self.value
            .as_str()
            .is_some_and(|s| DATE_PATTERN.is_match(s.trim()))
    }

    /// The value's text equals one of the candidates.
    pub fn is_in(&self, candidates: &[&str]) -> bool {
        self.as_str()
            .is_some_and(|text| candidates.iter().any(|c| *c == text))
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Scalar text form of the value.
    pub fn as_str(&self) -> Option<String> {
        scalar_text(&self.value)
    }

    /// The value as a list (arrays as-is, strings split on commas).
    pub fn as_array(&self) -> Vec<Value> {
        to_list(&self.value)
    }

    /// The value as an integer (floats are truncated).
    pub fn as_int(&self) -> Option<i64> {
        match Number::from_json(&self.value)? {
            Number::I64(n) => Some(n),
            Number::U64(n) => i64::try_from(n).ok(),
            Number::F64(n) => Some(n.trunc() as i64),
        }
    }

    /// The value as a float.
    pub fn as_float(&self) -> Option<f64> {
        Number::from_json(&self.value).map(Number::to_f64)
    }

    /// The value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Parses a JSON string value. Non-string values are returned as-is.
    pub fn as_json(&self) -> Option<Value> {
        match &self.value {
            Value::String(s) => serde_json::from_str(s).ok(),
            other => Some(other.clone()),
        }
    }

    /// `%value%` for `like` comparisons.
    pub fn as_like(&self) -> Option<String> {
        self.as_like_with(LikeSide::Both)
    }

    /// Wraps the value in `%` on the given side(s). `%` and `_` inside the
    /// value are escaped.
    pub fn as_like_with(&self, side: LikeSide) -> Option<String> {
        let text = self.as_str()?;
        let escaped = text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        Some(match side {
            LikeSide::Both => format!("%{escaped}%"),
            LikeSide::Left => format!("%{escaped}"),
            LikeSide::Right => format!("{escaped}%"),
        })
    }
}
