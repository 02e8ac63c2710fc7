//! Per-field value sanitization.
//!
//! A [`SanitizerPipeline`] holds an ordered list of [`Sanitizer`]s per field.
//! Every value headed for a predicate passes through the sanitizers of its
//! field, in the order they were registered. Sanitizers transform values
//! only; they never change fields or operators.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{FilterError, Result};

/// Key under which a sanitizer applies to every field.
pub const ALL_FIELDS: &str = "*";

/// A pure value transform.
///
/// An `Err` is not a per-value skip: it aborts the run as
/// [`FilterError::Sanitize`].
pub trait Sanitizer: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Transforms a value.
    fn sanitize(&self, value: Value) -> std::result::Result<Value, String>;
}

/// Applies a string transform to strings, recursing into arrays.
fn map_strings(value: Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| map_strings(v, f)).collect()),
        other => other,
    }
}

/// Trims surrounding whitespace from strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trim;

impl Sanitizer for Trim {
    fn name(&self) -> &str {
        "trim"
    }

    fn sanitize(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(map_strings(value, &|s| s.trim().to_string()))
    }
}

/// Lower-cases strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lowercase;

impl Sanitizer for Lowercase {
    fn name(&self) -> &str {
        "lowercase"
    }

    fn sanitize(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(map_strings(value, &|s| s.to_lowercase()))
    }
}

/// Upper-cases strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uppercase;

impl Sanitizer for Uppercase {
    fn name(&self) -> &str {
        "uppercase"
    }

    fn sanitize(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(map_strings(value, &|s| s.to_uppercase()))
    }
}

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

static WHITESPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Removes markup tags from strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripTags;

impl Sanitizer for StripTags {
    fn name(&self) -> &str {
        "strip_tags"
    }

    fn sanitize(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(map_strings(value, &|s| TAG_PATTERN.replace_all(s, "").into_owned()))
    }
}

/// Collapses runs of whitespace into single spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct Collapse;

impl Sanitizer for Collapse {
    fn name(&self) -> &str {
        "collapse"
    }

    fn sanitize(&self, value: Value) -> std::result::Result<Value, String> {
        Ok(map_strings(value, &|s| WHITESPACE_PATTERN.replace_all(s, " ").into_owned()))
    }
}

type SanitizeFn = dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync;

/// Sanitizer backed by a closure.
pub struct FnSanitizer {
    name: String,
    f: Box<SanitizeFn>,
}

impl Sanitizer for FnSanitizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn sanitize(&self, value: Value) -> std::result::Result<Value, String> {
        (self.f)(value)
    }
}

/// Wraps an infallible closure as a sanitizer.
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnSanitizer
where
    F: Fn(Value) -> Value + Send + Sync + 'static,
{
    FnSanitizer {
        name: name.into(),
        f: Box::new(move |value| Ok(f(value))),
    }
}

/// Wraps a fallible closure as a sanitizer.
pub fn try_from_fn<F>(name: impl Into<String>, f: F) -> FnSanitizer
where
    F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
{
    FnSanitizer {
        name: name.into(),
        f: Box::new(f),
    }
}

/// Looks up a built-in sanitizer by configuration name.
pub fn builtin(name: &str) -> Option<Arc<dyn Sanitizer>> {
    match name {
        "trim" => Some(Arc::new(Trim)),
        "lowercase" | "lower" => Some(Arc::new(Lowercase)),
        "uppercase" | "upper" => Some(Arc::new(Uppercase)),
        "strip_tags" => Some(Arc::new(StripTags)),
        "collapse" => Some(Arc::new(Collapse)),
        _ => None,
    }
}

/// Ordered sanitizers per field.
///
/// Sanitizers registered under [`ALL_FIELDS`] run first, then the field's
/// own, each group in registration order.
#[derive(Clone, Default)]
pub struct SanitizerPipeline {
    chains: BTreeMap<String, Vec<Arc<dyn Sanitizer>>>,
}

impl SanitizerPipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        SanitizerPipeline::default()
    }

    /// Appends a sanitizer to a field's chain.
    pub fn add<S: Sanitizer + 'static>(self, field: &str, sanitizer: S) -> Self {
        self.add_shared(field, Arc::new(sanitizer))
    }

    /// Appends an already shared sanitizer to a field's chain.
    pub fn add_shared(mut self, field: &str, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.chains
            .entry(field.to_string())
            .or_default()
            .push(sanitizer);
        self
    }

    /// Returns `true` when no sanitizer is registered.
    pub fn is_empty(&self) -> bool {
        self.chains.values().all(Vec::is_empty)
    }

    /// Returns the names of the sanitizers that apply to a field, in order.
    pub fn names_for(&self, field: &str) -> Vec<&str> {
        self.chain_for(field).map(|s| s.name()).collect()
    }

    fn chain_for<'a>(&'a self, field: &str) -> impl Iterator<Item = &'a Arc<dyn Sanitizer>> + 'a {
        let global = self.chains.get(ALL_FIELDS).into_iter().flatten();
        let own = if field == ALL_FIELDS {
            None
        } else {
            self.chains.get(field)
        };
        global.chain(own.into_iter().flatten())
    }

    /// Runs the field's sanitizers over a value.
    pub fn handle(&self, field: &str, value: Value) -> Result<Value> {
        self.run(self.chain_for(field), field, value)
    }

    /// Runs only the sanitizers registered under `field` itself, skipping
    /// the [`ALL_FIELDS`] chain.
    pub fn handle_own(&self, field: &str, value: Value) -> Result<Value> {
        let own = if field == ALL_FIELDS {
            None
        } else {
            self.chains.get(field)
        };
        self.run(own.into_iter().flatten(), field, value)
    }

    fn run<'a>(
        &'a self,
        chain: impl Iterator<Item = &'a Arc<dyn Sanitizer>>,
        field: &str,
        value: Value,
    ) -> Result<Value> {
        let mut value = value;
        for sanitizer in chain {
            value = sanitizer
                .sanitize(value)
                .map_err(|message| FilterError::Sanitize {
                    field: field.to_string(),
                    message: format!("{}: {message}", sanitizer.name()),
                })?;
        }
        Ok(value)
    }
}

impl fmt::Debug for SanitizerPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (field, chain) in &self.chains {
            let names: Vec<&str> = chain.iter().map(|s| s.name()).collect();
            map.entry(field, &names);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn runs_in_registration_order() {
        let pipeline = SanitizerPipeline::new()
            .add("name", Trim)
            .add("name", from_fn("suffix", |v| match v {
                Value::String(s) => Value::String(format!("{s}!")),
                other => other,
            }))
            .add("name", Uppercase);

        assert_eq!(pipeline.handle("name", json!("  bob ")).unwrap(), json!("BOB!"));
        assert_eq!(pipeline.names_for("name"), ["trim", "suffix", "uppercase"]);
    }

    #[test]
    fn global_sanitizers_run_first() {
        let pipeline = SanitizerPipeline::new()
            .add("name", from_fn("wrap", |v| match v {
                Value::String(s) => Value::String(format!("[{s}]")),
                other => other,
            }))
            .add(ALL_FIELDS, Trim);

        assert_eq!(pipeline.handle("name", json!(" a ")).unwrap(), json!("[a]"));
        assert_eq!(pipeline.handle("other", json!(" a ")).unwrap(), json!("a"));
    }

    #[test]
    fn own_chain_skips_global_sanitizers() {
        let pipeline = SanitizerPipeline::new()
            .add(ALL_FIELDS, from_fn("mark", |v| match v {
                Value::String(s) => Value::String(format!("{s}*")),
                other => other,
            }))
            .add("name", Lowercase);

        assert_eq!(pipeline.handle("name", json!("A")).unwrap(), json!("a*"));
        assert_eq!(pipeline.handle_own("name", json!("A")).unwrap(), json!("a"));
        assert_eq!(pipeline.handle_own(ALL_FIELDS, json!("A")).unwrap(), json!("A"));
    }

    #[test]
    fn fields_without_sanitizers_pass_through() {
        let pipeline = SanitizerPipeline::new().add("name", Lowercase);
        assert_eq!(pipeline.handle("status", json!("ACTIVE")).unwrap(), json!("ACTIVE"));
    }

    #[test]
    fn recurses_into_arrays_and_skips_non_strings() {
        let pipeline = SanitizerPipeline::new().add("tags", Lowercase);
        assert_eq!(
            pipeline.handle("tags", json!(["A", 1, "B"])).unwrap(),
            json!(["a", 1, "b"])
        );
    }

    #[test]
    fn strip_tags_and_collapse() {
        let pipeline = SanitizerPipeline::new()
            .add("q", StripTags)
            .add("q", Collapse);
        assert_eq!(
            pipeline.handle("q", json!("<b>hello</b>   world")).unwrap(),
            json!("hello world")
        );
    }

    #[test]
    fn failures_propagate() {
        let pipeline = SanitizerPipeline::new().add(
            "age",
            try_from_fn("positive", |v| match v.as_i64() {
                Some(n) if n >= 0 => Ok(v),
                _ => Err("must be a positive integer".to_string()),
            }),
        );

        assert!(pipeline.handle("age", json!(3)).is_ok());
        let err = pipeline.handle("age", json!(-1)).unwrap_err();
        assert!(matches!(err, FilterError::Sanitize { ref field, .. } if field == "age"));
    }

    #[test]
    fn builtins_by_name() {
        assert_eq!(builtin("trim").unwrap().name(), "trim");
        assert_eq!(builtin("lower").unwrap().name(), "lowercase");
        assert!(builtin("nope").is_none());
    }
}
