//! The predicate sink: the query builder an engine writes into.
//!
//! Sift never talks to a storage engine. Engines hand resolved clauses to a
//! [`PredicateSink`], which can be an ORM adapter, a SQL builder, or the
//! in-memory [`MemorySink`](crate::memory::MemorySink).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::sorting::Dir;

/// Boolean connective of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logical {
    /// Every child must hold.
    #[default]
    And,
    /// At least one child must hold.
    Or,
}

impl Logical {
    /// Returns the key used for this logical in tree input.
    pub fn as_str(self) -> &'static str {
        match self {
            Logical::And => "and",
            Logical::Or => "or",
        }
    }

    /// Parses a tree key (case-insensitive).
    pub fn from_key(key: &str) -> Option<Logical> {
        match key.to_ascii_lowercase().as_str() {
            "and" => Some(Logical::And),
            "or" => Some(Logical::Or),
            _ => None,
        }
    }
}

impl std::fmt::Display for Logical {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A nested builder scope, used for relation existence and grouping.
///
/// The sink calls the scope with the sink that should receive the nested
/// predicates.
pub type Scope<'s> = &'s mut dyn FnMut(&mut dyn PredicateSink) -> Result<()>;

/// Target of resolved clauses.
///
/// This is the `where` / `orWhere` model of SQL query builders. Each
/// predicate joins the ones added before it in the same scope:
///
/// - a clause joins with the scope's connective (AND at the top level, the
///   group's [`Logical`] inside a [`group`](Self::group));
/// - a nested group joins with its own [`Logical`].
///
/// AND binds tighter than OR, so `a, b, or-group(c, d)` inside an AND scope
/// reads `(a AND b) OR (c OR d)`.
///
/// Sinks are mutated incrementally and are not transactional: when a run
/// fails part-way, predicates added before the failure stay.
pub trait PredicateSink {
    /// `where(field, op, value)` with a native operator.
    fn where_clause(&mut self, field: &str, operator: &str, value: Value);

    /// `whereIn(field, values)`.
    fn where_in(&mut self, field: &str, values: Vec<Value>);

    /// `whereNotIn(field, values)`.
    fn where_not_in(&mut self, field: &str, values: Vec<Value>);

    /// `whereHas(relation, scope)`: at least one related record satisfies
    /// every predicate added inside the scope. `relation` is a single hop.
    fn where_has(&mut self, relation: &str, scope: Scope<'_>) -> Result<()>;

    /// Opens a parenthesized scope. The group joins its predecessors with
    /// `logical`, and so do the clauses added directly inside it. A scope
    /// that adds nothing should leave no trace.
    fn group(&mut self, logical: Logical, scope: Scope<'_>) -> Result<()>;

    /// Appends an ordering.
    fn order_by(&mut self, field: &str, dir: Dir);
}
