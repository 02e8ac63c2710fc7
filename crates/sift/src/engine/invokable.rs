//! Handler-dispatched filters.
//!
//! The filter declares the keys it understands. Each key present in the input
//! is dispatched to a handler, either its own or one named through a
//! *mentor* alias. Keys absent from the input run their fallback handler, if
//! one is registered.
//!
//! Handlers receive a [`Payload`], the sink and the run context, and write
//! whatever predicates they like.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{skip, Engine, FilterRun};
use crate::context::{FilterEvent, FilterRunContext, SkipReason};
use crate::error::{FilterError, Result};
use crate::payload::Payload;
use crate::settings::EmptyValue;
use crate::sink::PredicateSink;

/// Names a handler may not take: they collide with the filter's own
/// operations.
pub const RESERVED_HANDLER_NAMES: &[&str] = &[
    "apply", "filter", "handle", "settings", "sorting", "resolve", "engine", "context",
];

/// Handler signature.
pub type HandlerFn =
    dyn Fn(&Payload, &mut dyn PredicateSink, &FilterRunContext) -> Result<()> + Send + Sync;

/// Declared filter keys and the handlers behind them.
///
/// # Example
///
/// ```
/// use sift::{HandlerTable, PredicateSink};
/// use serde_json::Value;
///
/// let handlers = HandlerTable::new()
///     .handler("status", |payload, sink, _ctx| {
///         sink.where_clause("status", payload.operator(), payload.value().clone());
///         Ok(())
///     })
///     .mentor("state", "status")
///     .fallback("archived", |_payload, sink, _ctx| {
///         sink.where_clause("archived", "=", Value::Bool(false));
///         Ok(())
///     });
///
/// assert!(handlers.validate().is_ok());
/// assert_eq!(handlers.keys(), ["status", "state", "archived"]);
/// ```
#[derive(Clone, Default)]
pub struct HandlerTable {
    keys: Vec<String>,
    handlers: BTreeMap<String, Arc<HandlerFn>>,
    fallbacks: BTreeMap<String, Arc<HandlerFn>>,
    mentors: BTreeMap<String, String>,
}

impl HandlerTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        HandlerTable::default()
    }

    fn declare(&mut self, key: &str) {
        if !self.keys.iter().any(|k| k == key) {
            self.keys.push(key.to_string());
        }
    }

    /// Declares a key without a handler of its own.
    pub fn key(mut self, key: &str) -> Self {
        self.declare(key);
        self
    }

    /// Registers the handler for a key (declaring the key).
    pub fn handler<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Payload, &mut dyn PredicateSink, &FilterRunContext) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.declare(name);
        self.handlers.insert(name.to_string(), Arc::new(f));
        self
    }

    /// Routes a key to another key's handler.
    pub fn mentor(mut self, key: &str, handler: &str) -> Self {
        self.declare(key);
        self.mentors.insert(key.to_string(), handler.to_string());
        self
    }

    /// Registers a handler that runs when the key is absent from the input.
    pub fn fallback<F>(mut self, key: &str, f: F) -> Self
    where
        F: Fn(&Payload, &mut dyn PredicateSink, &FilterRunContext) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.declare(key);
        self.fallbacks.insert(key.to_string(), Arc::new(f));
        self
    }

    /// Declared keys, in declaration order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns `true` if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Rejects handler names that collide with reserved names.
    pub fn validate(&self) -> Result<()> {
        let names = self
            .handlers
            .keys()
            .chain(self.fallbacks.keys())
            .chain(self.mentors.values());
        for name in names {
            if RESERVED_HANDLER_NAMES.contains(&name.to_ascii_lowercase().as_str()) {
                return Err(FilterError::ReservedHandlerName(name.clone()));
            }
        }
        Ok(())
    }

    fn handler_for(&self, key: &str) -> Option<&Arc<HandlerFn>> {
        let name = self.mentors.get(key).map(String::as_str).unwrap_or(key);
        self.handlers.get(name)
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("keys", &self.keys)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("fallbacks", &self.fallbacks.keys().collect::<Vec<_>>())
            .field("mentors", &self.mentors)
            .finish()
    }
}

/// The invokable engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvokableEngine;

impl InvokableEngine {
    pub const NAME: &'static str = "invokable";
}

fn lookup<'v>(run: &FilterRun<'v>, key: &str) -> Option<&'v Value> {
    if let Some(value) = run.input.get(key) {
        return Some(value);
    }
    if run.settings.normalizes_keys() {
        let key = key.to_lowercase();
        return run
            .input
            .iter()
            .find(|(k, _)| k.to_lowercase() == key)
            .map(|(_, v)| v);
    }
    None
}

impl Engine for InvokableEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, run: &mut FilterRun<'_>, sink: &mut dyn PredicateSink) -> Result<()> {
        let settings = run.settings;
        let table = run.handlers;

        for key in table.keys() {
            let (handler, value) = match lookup(run, key) {
                Some(value) => {
                    let Some(handler) = table.handler_for(key) else {
                        skip(run.context, key, SkipReason::NoHandler);
                        continue;
                    };
                    if settings.empty_value(key, value)? == EmptyValue::Skip {
                        skip(run.context, key, SkipReason::EmptyValue);
                        continue;
                    }
                    (handler, settings.sanitize(key, value.clone())?)
                }
                None => match table.fallbacks.get(key) {
                    Some(handler) => (handler, Value::Null),
                    None => continue,
                },
            };

            let payload = Payload::new(key.as_str(), settings.default_native(), value);
            (**handler)(&payload, sink, &*run.context)?;
            run.context.emit(FilterEvent::ClauseApplied {
                field: key.clone(),
                operator: payload.operator().to_string(),
                relation: None,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySink, Predicate};
    use crate::sanitize::Lowercase;
    use crate::settings::FilterSettings;
    use serde_json::json;

    struct TenantId(u64);

    fn table() -> HandlerTable {
        HandlerTable::new()
            .handler("status", |payload, sink, _ctx| {
                sink.where_clause("status", payload.operator(), payload.value().clone());
                Ok(())
            })
            .mentor("state", "status")
            .handler("title", |payload, sink, _ctx| {
                if let Some(pattern) = payload.as_like() {
                    sink.where_clause("title", "like", Value::String(pattern));
                }
                Ok(())
            })
            .fallback("tenant", |_payload, sink, ctx| {
                if let Some(TenantId(id)) = ctx.provided().get::<TenantId>() {
                    sink.where_clause("tenant_id", "=", json!(id));
                }
                Ok(())
            })
            .key("orphan")
    }

    fn run(
        settings: &FilterSettings,
        handlers: &HandlerTable,
        context: &mut FilterRunContext,
        input: Value,
    ) -> Result<MemorySink> {
        let Value::Object(input) = input else {
            panic!("test input must be an object");
        };
        let mut sink = MemorySink::new();
        let mut run = FilterRun {
            input: &input,
            settings,
            handlers,
            context,
        };
        InvokableEngine.apply(&mut run, &mut sink)?;
        Ok(sink)
    }

    fn compare(field: &str, operator: &str, value: Value) -> Predicate {
        Predicate::Compare {
            field: field.into(),
            operator: operator.into(),
            value,
        }
    }

    #[test]
    fn dispatches_present_keys_and_fallbacks() {
        let settings = FilterSettings::builder()
            .sanitize("state", Lowercase)
            .build()
            .unwrap();
        let mut context = FilterRunContext::new().provide(TenantId(7));
        let sink = run(
            &settings,
            &table(),
            &mut context,
            json!({"state": "ACTIVE", "title": "rust", "orphan": 1, "unknown": 2}),
        )
        .unwrap();

        assert_eq!(
            sink.predicates(),
            [
                compare("status", "=", json!("active")),
                compare("title", "like", json!("%rust%")),
                compare("tenant_id", "=", json!(7)),
            ]
        );
        assert_eq!(context.applied(), 3);
    }

    #[test]
    fn fallback_is_skipped_when_key_is_present() {
        let settings = FilterSettings::builder().build().unwrap();
        let mut context = FilterRunContext::new().provide(TenantId(7));
        let sink = run(&settings, &table(), &mut context, json!({"tenant": "x"})).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn empty_values_can_be_ignored() {
        let settings = FilterSettings::builder()
            .ignore_empty_values(true)
            .build()
            .unwrap();
        let mut context = FilterRunContext::new();
        let sink = run(&settings, &table(), &mut context, json!({"status": ""})).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn normalized_keys_match_case_insensitively() {
        let settings = FilterSettings::builder()
            .normalize_keys(true)
            .build()
            .unwrap();
        let mut context = FilterRunContext::new();
        let sink = run(&settings, &table(), &mut context, json!({"STATUS": "x"})).unwrap();
        assert_eq!(sink.predicates(), [compare("status", "=", json!("x"))]);
    }

    #[test]
    fn handler_errors_propagate() {
        let handlers = HandlerTable::new().handler("status", |payload, _sink, _ctx| {
            Err(FilterError::invalid_format(payload.field(), "unsupported"))
        });
        let settings = FilterSettings::builder().build().unwrap();
        let mut context = FilterRunContext::new();
        assert!(run(&settings, &handlers, &mut context, json!({"status": 1})).is_err());
    }

    #[test]
    fn reserved_names_are_rejected() {
        let handlers = HandlerTable::new().handler("apply", |_, _, _| Ok(()));
        assert!(matches!(
            handlers.validate(),
            Err(FilterError::ReservedHandlerName(ref name)) if name == "apply"
        ));

        let mentored = HandlerTable::new().mentor("status", "Filter");
        assert!(mentored.validate().is_err());
    }
}
