//! Filter engines: interchangeable strategies that turn input into clauses.
//!
//! Every engine runs the same two phases per input entry:
//!
//! ```text
//! Resolve: field → operator → sanitized value (→ relation chain)
//! Apply:   Clause → PredicateSink
//! ```
//!
//! Engines hold no state between runs. Everything a run needs travels in a
//! [`FilterRun`].
//!
//! | Engine | Input shape |
//! |--------|-------------|
//! | [`RulesetEngine`] | `{field: value}`, `{field: "op:value"}`, `{field: {operator, value}}` |
//! | [`TreeEngine`] | `{and: [...]}`, `{or: [...]}`, `{field, operator, value}` |
//! | [`ExpressionEngine`] | `{field: value}`, `{field: {op: value, ...}}`, dotted relations |
//! | [`InvokableEngine`] | declared keys dispatched to registered handlers |

mod expression;
mod invokable;
mod ruleset;
mod tree;

pub use expression::ExpressionEngine;
pub use invokable::{HandlerFn, HandlerTable, InvokableEngine, RESERVED_HANDLER_NAMES};
pub use ruleset::RulesetEngine;
pub use tree::{TreeEngine, TreeNode};

use serde_json::{Map, Value};

use crate::clause::Clause;
use crate::context::{FilterEvent, FilterRunContext, SkipReason};
use crate::error::Result;
use crate::relation::RelationPath;
use crate::settings::FilterSettings;
use crate::sink::PredicateSink;

/// Everything one engine run reads or reports to.
#[derive(Debug)]
pub struct FilterRun<'a> {
    /// The filter input (already extracted from the request).
    pub input: &'a Map<String, Value>,
    /// Validation rules for this run.
    pub settings: &'a FilterSettings,
    /// Handlers for the invokable engine.
    pub handlers: &'a HandlerTable,
    /// Per-run context (events, provided data).
    pub context: &'a mut FilterRunContext,
}

/// A filter resolution strategy.
pub trait Engine: Send + Sync {
    /// Canonical engine name.
    fn name(&self) -> &str;

    /// Resolves the run's input and applies the resulting clauses to `sink`.
    ///
    /// Each entry is validated before it touches the sink. On error the run
    /// stops; clauses applied for earlier entries remain in the sink.
    fn apply(&self, run: &mut FilterRun<'_>, sink: &mut dyn PredicateSink) -> Result<()>;
}

/// A validated field: the column to compare and the relation leading to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Target {
    pub column: String,
    pub relation: Option<RelationPath>,
}

/// Resolves a raw field name.
///
/// Dotted names go through the relation rules when `relations` is set;
/// everything else goes through the field allow-list. `Ok(None)` means the
/// entry is dropped (permissive mode).
pub(crate) fn resolve_target(
    settings: &FilterSettings,
    raw: &str,
    relations: bool,
) -> Result<Option<Target>> {
    let fields = settings.fields();
    let normalized = fields.normalize(raw);

    if relations && normalized.contains('.') {
        let mapped = fields.resolve(&normalized);
        let (path, terminal) = RelationPath::split(&mapped);
        if let Some(path) = path {
            if terminal.is_empty() || path.hops().iter().any(String::is_empty) {
                return match settings.is_strict() {
                    true => Err(crate::FilterError::not_allowed_field(normalized)),
                    false => Ok(None),
                };
            }
            if !settings.check_relation(&path, &terminal)? {
                return Ok(None);
            }
            return Ok(Some(Target {
                column: terminal,
                relation: Some(path),
            }));
        }
    }

    Ok(fields
        .check(raw, settings.is_strict())?
        .map(|column| Target {
            column,
            relation: None,
        }))
}

/// Builds the clause for a target and hands it to the sink.
pub(crate) fn emit(
    target: Target,
    operator: String,
    value: Value,
    sink: &mut dyn PredicateSink,
    context: &mut FilterRunContext,
) -> Result<()> {
    let mut clause = Clause::new(target.column, operator, value);
    if let Some(path) = target.relation {
        clause = clause.through(path);
    }
    clause.apply(sink)?;
    tracing::trace!(
        field = %clause.field,
        operator = %clause.operator,
        relation = ?clause.relation_path(),
        "clause applied"
    );
    context.emit(FilterEvent::ClauseApplied {
        field: clause.field.clone(),
        operator: clause.operator.clone(),
        relation: clause.relation_path(),
    });
    Ok(())
}

/// Records a skipped entry on the run context.
pub(crate) fn skip(context: &mut FilterRunContext, field: &str, reason: SkipReason) {
    context.skipped(field, reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::RelationRules;
    use crate::FilterError;

    fn settings(strict: bool) -> FilterSettings {
        FilterSettings::builder()
            .allow_fields(["status", "state"])
            .map_field("state", "status")
            .map_field("tag", "tags.name")
            .relations(RelationRules::scoped().scope("tags", ["name"]))
            .strict(strict)
            .build()
            .unwrap()
    }

    #[test]
    fn plain_fields_use_allow_list() {
        let target = resolve_target(&settings(true), "state", true).unwrap().unwrap();
        assert_eq!(target.column, "status");
        assert!(target.relation.is_none());
    }

    #[test]
    fn dotted_fields_use_relation_rules() {
        let target = resolve_target(&settings(true), "tags.name", true)
            .unwrap()
            .unwrap();
        assert_eq!(target.column, "name");
        assert_eq!(target.relation.unwrap().chain(), "tags");

        assert!(matches!(
            resolve_target(&settings(true), "tags.id", true),
            Err(FilterError::NotAllowedField { .. })
        ));
        assert_eq!(resolve_target(&settings(false), "tags.id", true).unwrap(), None);
    }

    #[test]
    fn dotted_fields_without_relations_use_allow_list() {
        assert_eq!(resolve_target(&settings(false), "tags.name", false).unwrap(), None);
    }

    #[test]
    fn malformed_paths_are_rejected() {
        assert!(resolve_target(&settings(true), "tags.", true).is_err());
        assert_eq!(resolve_target(&settings(false), ".name", true).unwrap(), None);
    }
}
