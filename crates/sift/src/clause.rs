//! The resolved clause: the unit every engine produces.
//!
//! A [`Clause`] is a field, a native operator and a sanitized value,
//! optionally reached through a relation chain. Clauses are built per input
//! entry, applied to a [`PredicateSink`], and dropped.

use serde_json::Value;

use crate::error::Result;
use crate::op::Op;
use crate::relation::RelationPath;
use crate::sink::PredicateSink;
use crate::value::to_list;

/// A single resolved predicate.
///
/// # Example
///
/// ```
/// use sift::Clause;
/// use serde_json::json;
///
/// let clause = Clause::new("status", "=", json!("pending"));
/// assert!(!clause.is_relational());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// The column to compare (terminal field for relational clauses).
    pub field: String,
    /// The sink-native operator.
    pub operator: String,
    /// The sanitized comparison value.
    pub value: Value,
    /// Relation chain leading to `field`, if any.
    pub relation: Option<RelationPath>,
}

impl Clause {
    /// Creates a direct clause.
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Clause {
            field: field.into(),
            operator: operator.into(),
            value,
            relation: None,
        }
    }

    /// Attaches a relation chain, making this a relational clause.
    pub fn through(mut self, relation: RelationPath) -> Self {
        self.relation = Some(relation);
        self
    }

    /// Returns `true` if the clause is reached through a relation.
    pub fn is_relational(&self) -> bool {
        self.relation.is_some()
    }

    /// Returns the relation chain as a dotted string.
    pub fn relation_path(&self) -> Option<String> {
        self.relation.as_ref().map(RelationPath::chain)
    }

    /// Hands the clause to a sink.
    ///
    /// Relational clauses nest one `where_has` per hop. Membership operators
    /// become `where_in` / `where_not_in`; everything else is a plain
    /// `where_clause`.
    pub fn apply(&self, sink: &mut dyn PredicateSink) -> Result<()> {
        match &self.relation {
            Some(path) => path.nest(sink, &mut |inner: &mut dyn PredicateSink| {
                self.apply_direct(inner);
                Ok(())
            }),
            None => {
                self.apply_direct(sink);
                Ok(())
            }
        }
    }

    fn apply_direct(&self, sink: &mut dyn PredicateSink) {
        match Op::from_native(&self.operator) {
            Some(Op::In) => sink.where_in(&self.field, to_list(&self.value)),
            Some(Op::NotIn) => sink.where_not_in(&self.field, to_list(&self.value)),
            _ => sink.where_clause(&self.field, &self.operator, self.value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySink, Predicate};
    use serde_json::json;

    #[test]
    fn direct_clause_becomes_where() {
        let mut sink = MemorySink::new();
        Clause::new("status", "=", json!("pending"))
            .apply(&mut sink)
            .unwrap();

        assert_eq!(
            sink.predicates(),
            [Predicate::Compare {
                field: "status".into(),
                operator: "=".into(),
                value: json!("pending"),
            }]
        );
    }

    #[test]
    fn membership_becomes_where_in() {
        let mut sink = MemorySink::new();
        Clause::new("status", "in", json!("a,b"))
            .apply(&mut sink)
            .unwrap();
        Clause::new("status", "not in", json!(["c"]))
            .apply(&mut sink)
            .unwrap();

        assert_eq!(
            sink.predicates(),
            [
                Predicate::In {
                    field: "status".into(),
                    values: vec![json!("a"), json!("b")],
                    negated: false,
                },
                Predicate::In {
                    field: "status".into(),
                    values: vec![json!("c")],
                    negated: true,
                },
            ]
        );
    }

    #[test]
    fn relational_clause_nests_per_hop() {
        let mut sink = MemorySink::new();
        let clause = Clause::new("name", "=", json!("ann"))
            .through(RelationPath::from_hops(["author", "profile"]));
        assert_eq!(clause.relation_path().as_deref(), Some("author.profile"));
        clause.apply(&mut sink).unwrap();

        assert_eq!(
            sink.predicates(),
            [Predicate::Has {
                relation: "author".into(),
                inner: vec![Predicate::Has {
                    relation: "profile".into(),
                    inner: vec![Predicate::Compare {
                        field: "name".into(),
                        operator: "=".into(),
                        value: json!("ann"),
                    }],
                }],
            }]
        );
    }
}
