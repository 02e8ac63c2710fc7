//! Request input: parameters and headers.
//!
//! A [`FilterRequest`] is what a web layer hands to a filter: decoded
//! parameters as a JSON object plus request headers. Parameters can come
//! from a JSON body or from decoded query pairs in bracket notation
//! (`filter[age][gte]=18`, `tags[]=a&tags[]=b`).

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{FilterError, Result};

/// Case-insensitive header map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    values: BTreeMap<String, String>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Headers::default()
    }

    /// Adds a header, replacing any previous value.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a header, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.values
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    /// Looks a header up by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns `true` if no header is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parameters and headers of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterRequest {
    params: Map<String, Value>,
    headers: Headers,
}

impl FilterRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        FilterRequest::default()
    }

    /// Builds a request from a JSON object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(params) => Ok(FilterRequest {
                params,
                headers: Headers::new(),
            }),
            _ => Err(FilterError::invalid_format("$", "request parameters must be an object")),
        }
    }

    /// Parses a JSON object from text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        FilterRequest::from_json(serde_json::from_str(text)?)
    }

    /// Builds a request from decoded query pairs.
    ///
    /// Bracket segments nest objects; an empty segment (`[]`) appends to an
    /// array. A repeated plain key keeps the last value.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Map::new();
        for (key, value) in pairs {
            let segments = key_segments(key.as_ref());
            insert_path(&mut params, &segments, Value::String(value.into()));
        }
        FilterRequest {
            params,
            headers: Headers::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a parameter.
    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    /// All parameters.
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// A single parameter.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// The request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Extracts the filter input.
    ///
    /// With a filter key, the input is the object under that key (a JSON
    /// string is parsed; a missing key is empty input). Without one, every
    /// parameter except the `reserved` keys is input.
    pub fn filter_input(&self, key: Option<&str>, reserved: &[&str]) -> Result<Map<String, Value>> {
        let Some(key) = key else {
            return Ok(self
                .params
                .iter()
                .filter(|(k, _)| !reserved.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect());
        };
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(input)) => Ok(input.clone()),
            Some(Value::String(text)) if text.trim().is_empty() => Ok(Map::new()),
            Some(Value::String(text)) => match serde_json::from_str(text) {
                Ok(Value::Object(input)) => Ok(input),
                _ => Err(FilterError::invalid_format(key, "expected a JSON object")),
            },
            Some(_) => Err(FilterError::invalid_format(key, "expected an object")),
        }
    }
}

/// Splits `a[b][c]` into `["a", "b", "c"]`. Malformed brackets keep the raw
/// key.
fn key_segments(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 || !key.ends_with(']') {
        return vec![key.to_string()];
    }
    let mut segments = vec![key[..open].to_string()];
    for part in key[open + 1..key.len() - 1].split("][") {
        if part.contains('[') || part.contains(']') {
            return vec![key.to_string()];
        }
        segments.push(part.to_string());
    }
    segments
}

fn insert_path(map: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    match rest.first().map(String::as_str) {
        None => {
            map.insert(head.clone(), value);
        }
        Some("") => {
            let slot = map
                .entry(head.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                items.push(value);
            }
        }
        Some(_) => {
            let slot = map
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(nested) = slot {
                insert_path(nested, rest, value);
            }
        }
    }
}
