//! Field → operator map expressions.
//!
//! ```json
//! {"status": "active", "age": {"gte": 18, "lt": 65}, "tags.name": "rust"}
//! ```
//!
//! A plain value uses the default operator. An object maps operator tokens to
//! values, one clause per entry. Dotted fields are relation paths.

use serde_json::Value;

use super::{emit, resolve_target, skip, Engine, FilterRun};
use crate::context::SkipReason;
use crate::error::Result;
use crate::settings::{EmptyValue, FilterSettings};
use crate::sink::PredicateSink;

/// The expression engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionEngine;

impl ExpressionEngine {
    pub const NAME: &'static str = "expression";
}

/// Expands one input entry into `(operator token, value)` pairs.
fn conditions(settings: &FilterSettings, raw: &Value) -> Vec<(String, Value)> {
    match raw {
        Value::Object(ops) => ops.iter().map(|(op, v)| (op.clone(), v.clone())).collect(),
        other => vec![(settings.default_operator().to_string(), other.clone())],
    }
}

impl Engine for ExpressionEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, run: &mut FilterRun<'_>, sink: &mut dyn PredicateSink) -> Result<()> {
        let settings = run.settings;
        for (raw_field, raw) in run.input {
            // `{}` expands to nothing, so the policy sees the whole entry first.
            if settings.empty_value(raw_field, raw)? == EmptyValue::Skip {
                skip(run.context, raw_field, SkipReason::EmptyValue);
                continue;
            }
            for (token, value) in conditions(settings, raw) {
                let operator = settings.resolve_operator(&token, Some(raw_field))?;

                let Some(target) = resolve_target(settings, raw_field, true)? else {
                    skip(run.context, raw_field, SkipReason::NotAllowed);
                    continue;
                };
                if target.relation.is_none() && !settings.check_column(&target.column)? {
                    skip(run.context, raw_field, SkipReason::UnknownColumn);
                    continue;
                }
                if settings.empty_value(raw_field, &value)? == EmptyValue::Skip {
                    skip(run.context, raw_field, SkipReason::EmptyValue);
                    continue;
                }

                let value = settings.sanitize(raw_field, value)?;
                emit(target, operator, value, sink, run.context)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FilterRunContext;
    use crate::engine::HandlerTable;
    use crate::error::FilterError;
    use crate::memory::{MemorySink, Predicate};
    use crate::relation::RelationRules;
    use serde_json::json;

    fn run(settings: &FilterSettings, input: Value) -> Result<MemorySink> {
        let Value::Object(input) = input else {
            panic!("test input must be an object");
        };
        let handlers = HandlerTable::new();
        let mut context = FilterRunContext::new();
        let mut sink = MemorySink::new();
        let mut run = FilterRun {
            input: &input,
            settings,
            handlers: &handlers,
            context: &mut context,
        };
        ExpressionEngine.apply(&mut run, &mut sink)?;
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
    fn operator_maps_expand_to_clauses() {
        let settings = FilterSettings::builder().allow_any_field().build().unwrap();
        let sink = run(&settings, json!({"age": {"gte": 18, "lt": 65}, "status": "active"})).unwrap();
        assert_eq!(
            sink.predicates(),
            [
                compare("age", ">=", json!(18)),
                compare("age", "<", json!(65)),
                compare("status", "=", json!("active")),
            ]
        );
    }

    #[test]
    fn relation_and_direct_clause() {
        let settings = FilterSettings::builder()
            .allow_fields(["status"])
            .relations(RelationRules::list(["tags"]))
            .build()
            .unwrap();
        let sink = run(
            &settings,
            json!({"tags.name": "stopped", "status": {"eq": "stopped"}}),
        )
        .unwrap();

        assert_eq!(
            sink.predicates(),
            [
                compare("status", "=", json!("stopped")),
                Predicate::Has {
                    relation: "tags".into(),
                    inner: vec![compare("name", "=", json!("stopped"))],
                },
            ]
        );
    }

    #[test]
    fn strict_mode_rejects_invalid_operator() {
        let settings = FilterSettings::builder()
            .allow_any_field()
            .allow_operators(["eq", "gt"])
            .strict(true)
            .build()
            .unwrap();
        assert!(matches!(
            run(&settings, json!({"age": {"approx": 3}})),
            Err(FilterError::InvalidOperator { ref operator, .. }) if operator == "approx"
        ));
    }

    #[test]
    fn permissive_mode_falls_back_to_default_operator() {
        let settings = FilterSettings::builder()
            .allow_any_field()
            .allow_operators(["eq", "gt"])
            .build()
            .unwrap();
        let sink = run(&settings, json!({"age": {"approx": 3}})).unwrap();
        assert_eq!(sink.predicates(), [compare("age", "=", json!(3))]);
    }

    #[test]
    fn disallowed_relation_is_dropped_when_permissive() {
        let settings = FilterSettings::builder()
            .allow_any_field()
            .relations(RelationRules::scoped().scope("tags", ["name"]))
            .build()
            .unwrap();
        let sink = run(&settings, json!({"tags.id": 3, "author.name": "x"})).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn empty_operator_map_meets_empty_value_policy() {
        let reject = FilterSettings::builder()
            .allow_any_field()
            .reject_empty_values(true)
            .build()
            .unwrap();
        assert!(matches!(
            run(&reject, json!({"status": {}})),
            Err(FilterError::NotAllowedEmptyValue { ref field }) if field == "status"
        ));
        assert!(matches!(
            run(&reject, json!({"status": {"eq": ""}})),
            Err(FilterError::NotAllowedEmptyValue { .. })
        ));

        let ignore = FilterSettings::builder()
            .allow_any_field()
            .ignore_empty_values(true)
            .build()
            .unwrap();
        let sink = run(&ignore, json!({"status": {}, "age": {"gt": 3}})).unwrap();
        assert_eq!(sink.predicates(), [compare("age", ">", json!(3))]);
    }

    #[test]
    fn aliases_run_the_column_sanitizers() {
        let settings = FilterSettings::builder()
            .allow_fields(["status"])
            .map_field("state", "status")
            .sanitize("status", crate::sanitize::Lowercase)
            .build()
            .unwrap();
        let sink = run(&settings, json!({"state": {"eq": "ACTIVE"}})).unwrap();
        assert_eq!(sink.predicates(), [compare("status", "=", json!("active"))]);
    }

    #[test]
    fn unknown_columns_are_skipped() {
        let settings = FilterSettings::builder()
            .allow_any_field()
            .schema_columns(["status"])
            .build()
            .unwrap();
        let sink = run(&settings, json!({"ghost": 1, "status": "ok"})).unwrap();
        assert_eq!(sink.predicates(), [compare("status", "=", json!("ok"))]);
    }
}
