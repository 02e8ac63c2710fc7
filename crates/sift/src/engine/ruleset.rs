//! Flat key/value rules.
//!
//! Each input entry is one rule. The value can be plain (default operator),
//! `"op:value"` when `op` is a registered token, or an explicit
//! `{"operator": ..., "value": ...}` object.

use serde_json::Value;

use super::{emit, resolve_target, skip, Engine, FilterRun};
use crate::context::SkipReason;
use crate::error::{FilterError, Result};
use crate::settings::{EmptyValue, FilterSettings};
use crate::sink::PredicateSink;

/// The flat ruleset engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesetEngine;

impl RulesetEngine {
    pub const NAME: &'static str = "ruleset";
}

/// Splits a rule value into an optional operator token and the value.
fn split_rule(settings: &FilterSettings, field: &str, raw: &Value) -> Result<(Option<String>, Value)> {
    match raw {
        Value::Object(rule) => {
            let operator = match rule.get("operator") {
                Some(Value::String(token)) => token.clone(),
                Some(_) => {
                    return Err(FilterError::invalid_format(
                        format!("{field}.operator"),
                        "operator must be a string",
                    ))
                }
                None => {
                    return Err(FilterError::invalid_format(
                        field,
                        "expected an object with `operator` and `value`",
                    ))
                }
            };
            let value = rule.get("value").cloned().ok_or_else(|| {
                FilterError::invalid_format(field, "expected an object with `operator` and `value`")
            })?;
            Ok((Some(operator), value))
        }
        Value::String(text) => match text.split_once(':') {
            Some((prefix, rest)) if settings.operators().contains(prefix) => {
                Ok((Some(prefix.to_string()), Value::String(rest.to_string())))
            }
            _ => Ok((None, raw.clone())),
        },
        other => Ok((None, other.clone())),
    }
}

impl Engine for RulesetEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, run: &mut FilterRun<'_>, sink: &mut dyn PredicateSink) -> Result<()> {
        let settings = run.settings;
        for (raw_field, raw_value) in run.input {
            let Some(target) = resolve_target(settings, raw_field, false)? else {
                skip(run.context, raw_field, SkipReason::NotAllowed);
                continue;
            };
            let (token, value) = split_rule(settings, raw_field, raw_value)?;
            if settings.empty_value(raw_field, &value)? == EmptyValue::Skip {
                skip(run.context, raw_field, SkipReason::EmptyValue);
                continue;
            }
            let operator = match token {
                Some(token) => settings.resolve_operator(&token, Some(raw_field))?,
                None => settings.default_native().to_string(),
            };
            let value = settings.sanitize(raw_field, value)?;
            emit(target, operator, value, sink, run.context)?;
        }
        Ok(())
    }
}
