//! In-memory predicate sink.
//!
//! [`MemorySink`] records everything an engine applies as a [`Predicate`]
//! tree and can evaluate that tree against JSON rows. It backs the tests, the
//! CLI and any caller that wants to filter plain data without a database.
//!
//! Rows are JSON objects. A relation hop names a key holding either a nested
//! object (to-one) or an array of objects (to-many); `where_has` matches when
//! at least one related object satisfies the nested predicates. Groups join
//! their siblings the way [`PredicateSink`] describes.
//!
//! # Example
//!
//! ```
//! use sift::memory::MemorySink;
//! use sift::PredicateSink;
//! use serde_json::json;
//!
//! let mut sink = MemorySink::new();
//! sink.where_clause("status", "=", json!("pending"));
//!
//! let rows = vec![json!({"status": "pending"}), json!({"status": "done"})];
//! assert_eq!(sink.count(&rows), 1);
//! ```

use std::cmp::Ordering;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::op::Op;
use crate::sink::{Logical, PredicateSink, Scope};
use crate::sorting::{Dir, OrderBy};
use crate::value::{compare_values, loose_eq, scalar_text, to_list};

/// A recorded predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// `where(field, operator, value)`.
    Compare {
        field: String,
        operator: String,
        value: Value,
    },
    /// `whereIn` / `whereNotIn`.
    In {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// `whereHas(relation, ...)`: every inner predicate holds on one related row.
    Has {
        relation: String,
        inner: Vec<Predicate>,
    },
    /// A grouping scope.
    Group {
        logical: Logical,
        children: Vec<Predicate>,
    },
}

impl Predicate {
    /// Tests the predicate against a row.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Predicate::Compare {
                field,
                operator,
                value,
            } => compare(lookup(row, field), operator, value),
            Predicate::In {
                field,
                values,
                negated,
            } => {
                let actual = lookup(row, field);
                if actual.is_null() {
                    return false;
                }
                values.iter().any(|v| loose_eq(actual, v)) != *negated
            }
            Predicate::Has { relation, inner } => {
                let related = lookup(row, relation);
                match related {
                    Value::Array(items) => items.iter().any(|r| scope(inner, Logical::And, r)),
                    Value::Object(_) => scope(inner, Logical::And, related),
                    _ => false,
                }
            }
            Predicate::Group { logical, children } => scope(children, *logical, row),
        }
    }

    /// How this predicate joins the ones before it inside a scope.
    fn connective(&self, scope: Logical) -> Logical {
        match self {
            Predicate::Group { logical, .. } => *logical,
            _ => scope,
        }
    }
}

/// Evaluates a scope's predicates left to right, AND binding tighter than OR.
fn scope(predicates: &[Predicate], logical: Logical, row: &Value) -> bool {
    let Some((first, rest)) = predicates.split_first() else {
        return true;
    };
    let mut matched = false;
    let mut run = first.matches(row);
    for predicate in rest {
        if predicate.connective(logical) == Logical::Or {
            matched |= run;
            run = true;
        }
        run = run && predicate.matches(row);
    }
    matched || run
}

fn lookup<'a>(row: &'a Value, field: &str) -> &'a Value {
    row.get(field).unwrap_or(&Value::Null)
}

fn compare(actual: &Value, operator: &str, expected: &Value) -> bool {
    let ordered = |accept: fn(Ordering) -> bool| {
        !actual.is_null() && compare_values(actual, expected).is_some_and(accept)
    };

    match Op::from_native(operator) {
        Some(Op::Eq) => loose_eq(actual, expected),
        Some(Op::Neq) => !actual.is_null() && !loose_eq(actual, expected),
        Some(Op::Gt) => ordered(|o| o == Ordering::Greater),
        Some(Op::Gte) => ordered(|o| o != Ordering::Less),
        Some(Op::Lt) => ordered(|o| o == Ordering::Less),
        Some(Op::Lte) => ordered(|o| o != Ordering::Greater),
        Some(Op::Like) => like(actual, expected),
        Some(Op::NotLike) => !actual.is_null() && !like(actual, expected),
        Some(Op::In) => !actual.is_null() && to_list(expected).iter().any(|v| loose_eq(actual, v)),
        Some(Op::NotIn) => {
            !actual.is_null() && !to_list(expected).iter().any(|v| loose_eq(actual, v))
        }
        Some(Op::Between) => between(actual, expected),
        Some(Op::Null) => actual.is_null(),
        Some(Op::NotNull) => !actual.is_null(),
        None => {
            tracing::debug!(operator, "unknown operator in memory sink, no match");
            false
        }
    }
}

fn between(actual: &Value, bounds: &Value) -> bool {
    let bounds = to_list(bounds);
    let [low, high] = bounds.as_slice() else {
        return false;
    };
    !actual.is_null()
        && compare_values(actual, low).is_some_and(|o| o != Ordering::Less)
        && compare_values(actual, high).is_some_and(|o| o != Ordering::Greater)
}

/// SQL `LIKE`, case-insensitive: `%` is any run, `_` any single character,
/// `\` escapes the next character.
fn like(actual: &Value, pattern: &Value) -> bool {
    let (Some(text), Some(pattern)) = (scalar_text(actual), scalar_text(pattern)) else {
        return false;
    };
    let mut source = String::from("(?is)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    source.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).is_ok_and(|re| re.is_match(&text))
}

/// A sink that records predicates and orderings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemorySink {
    predicates: Vec<Predicate>,
    orders: Vec<OrderBy>,
}

impl MemorySink {
    /// Creates an empty sink. An empty sink matches every row.
    pub fn new() -> Self {
        MemorySink::default()
    }

    /// Top-level predicates, in application order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Orderings, in application order.
    pub fn orders(&self) -> &[OrderBy] {
        &self.orders
    }

    /// Returns `true` if nothing was applied.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty() && self.orders.is_empty()
    }

    /// Tests a row against the recorded predicates.
    pub fn matches(&self, row: &Value) -> bool {
        scope(&self.predicates, Logical::And, row)
    }

    /// Returns the matching rows, sorted by the recorded orderings.
    pub fn filter<'a>(&self, rows: &'a [Value]) -> Vec<&'a Value> {
        let mut results: Vec<&'a Value> = rows.iter().filter(|row| self.matches(row)).collect();
        if !self.orders.is_empty() {
            results.sort_by(|a, b| compare_rows(a, b, &self.orders));
        }
        results
    }

    /// Counts matching rows.
    pub fn count(&self, rows: &[Value]) -> usize {
        rows.iter().filter(|row| self.matches(row)).count()
    }

    fn scoped(scope: Scope<'_>) -> Result<Vec<Predicate>> {
        let mut nested = MemorySink::new();
        scope(&mut nested)?;
        Ok(nested.predicates)
    }
}

fn compare_rows(a: &Value, b: &Value, orders: &[OrderBy]) -> Ordering {
    for order in orders {
        if let Some(ordering) = compare_values(lookup(a, &order.field), lookup(b, &order.field)) {
            if ordering != Ordering::Equal {
                return order.dir.apply(ordering);
            }
        }
    }
    Ordering::Equal
}

impl PredicateSink for MemorySink {
    fn where_clause(&mut self, field: &str, operator: &str, value: Value) {
        self.predicates.push(Predicate::Compare {
            field: field.to_string(),
            operator: operator.to_string(),
            value,
        });
    }

    fn where_in(&mut self, field: &str, values: Vec<Value>) {
        self.predicates.push(Predicate::In {
            field: field.to_string(),
            values,
            negated: false,
        });
    }

    fn where_not_in(&mut self, field: &str, values: Vec<Value>) {
        self.predicates.push(Predicate::In {
            field: field.to_string(),
            values,
            negated: true,
        });
    }

    fn where_has(&mut self, relation: &str, scope: Scope<'_>) -> Result<()> {
        let inner = MemorySink::scoped(scope)?;
        self.predicates.push(Predicate::Has {
            relation: relation.to_string(),
            inner,
        });
        Ok(())
    }

    fn group(&mut self, logical: Logical, scope: Scope<'_>) -> Result<()> {
        let children = MemorySink::scoped(scope)?;
        // An empty group would otherwise OR-join as "always true".
        if !children.is_empty() {
            self.predicates.push(Predicate::Group { logical, children });
        }
        Ok(())
    }

    fn order_by(&mut self, field: &str, dir: Dir) {
        self.orders.push(OrderBy::new(field, dir));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![
            json!({"id": 1, "status": "pending", "title": "Fix login", "score": 5,
                   "tags": [{"name": "bug"}], "author": {"name": "ann"}}),
            json!({"id": 2, "status": "done", "title": "Write docs", "score": 9,
                   "tags": [{"name": "docs"}, {"name": "bug"}], "author": {"name": "bob"}}),
            json!({"id": 3, "status": "pending", "title": "Refactor", "score": null,
                   "tags": [], "author": null}),
        ]
    }

    fn ids(sink: &MemorySink) -> Vec<i64> {
        let rows = rows();
        sink.filter(&rows)
            .into_iter()
            .filter_map(|r| r["id"].as_i64())
            .collect()
    }

    #[test]
    fn empty_sink_matches_everything() {
        assert_eq!(MemorySink::new().count(&rows()), 3);
    }

    #[test]
    fn comparisons() {
        let mut sink = MemorySink::new();
        sink.where_clause("score", ">=", json!("5"));
        sink.where_clause("score", "<", json!(9));
        assert_eq!(ids(&sink), vec![1]);

        let mut sink = MemorySink::new();
        sink.where_clause("status", "!=", json!("done"));
        assert_eq!(ids(&sink), vec![1, 3]);
    }

    #[test]
    fn like_and_between() {
        let mut sink = MemorySink::new();
        sink.where_clause("title", "like", json!("%DOC%"));
        assert_eq!(ids(&sink), vec![2]);

        let mut sink = MemorySink::new();
        sink.where_clause("title", "like", json!("fix\\_%"));
        assert!(ids(&sink).is_empty());

        let mut sink = MemorySink::new();
        sink.where_clause("score", "between", json!([4, 6]));
        assert_eq!(ids(&sink), vec![1]);
    }

    #[test]
    fn null_checks() {
        let mut sink = MemorySink::new();
        sink.where_clause("score", "is null", Value::Null);
        assert_eq!(ids(&sink), vec![3]);

        let mut sink = MemorySink::new();
        sink.where_clause("author", "is not null", Value::Null);
        assert_eq!(ids(&sink), vec![1, 2]);
    }

    #[test]
    fn membership() {
        let mut sink = MemorySink::new();
        sink.where_in("id", vec![json!("1"), json!(3)]);
        assert_eq!(ids(&sink), vec![1, 3]);

        let mut sink = MemorySink::new();
        sink.where_not_in("status", vec![json!("pending")]);
        assert_eq!(ids(&sink), vec![2]);
    }

    #[test]
    fn relations_cover_arrays_and_objects() {
        let mut sink = MemorySink::new();
        sink.where_has("tags", &mut |inner: &mut dyn PredicateSink| {
            inner.where_clause("name", "=", json!("bug"));
            Ok(())
        })
        .unwrap();
        assert_eq!(ids(&sink), vec![1, 2]);

        let mut sink = MemorySink::new();
        sink.where_has("author", &mut |inner: &mut dyn PredicateSink| {
            inner.where_clause("name", "=", json!("bob"));
            Ok(())
        })
        .unwrap();
        assert_eq!(ids(&sink), vec![2]);
    }

    #[test]
    fn nested_groups_join_with_their_own_logical() {
        let or_group = |inner: &mut dyn PredicateSink| {
            inner.where_clause("score", ">", json!(6));
            inner.where_clause("title", "like", json!("refactor"));
            Ok(())
        };

        // pending OR (score > 6 OR title like refactor)
        let mut sink = MemorySink::new();
        sink.where_clause("status", "=", json!("pending"));
        sink.group(Logical::Or, &mut { or_group }).unwrap();
        assert_eq!(ids(&sink), vec![1, 2, 3]);
        assert!(matches!(sink.predicates()[1], Predicate::Group { logical: Logical::Or, .. }));

        // pending AND (score > 6 OR title like refactor)
        let mut sink = MemorySink::new();
        sink.where_clause("status", "=", json!("pending"));
        sink.group(Logical::And, &mut |inner: &mut dyn PredicateSink| {
            inner.group(Logical::Or, &mut { or_group })
        })
        .unwrap();
        assert_eq!(ids(&sink), vec![3]);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // (status = done AND score > 6) OR id = 3
        let mut sink = MemorySink::new();
        sink.group(Logical::And, &mut |inner: &mut dyn PredicateSink| {
            inner.where_clause("status", "=", json!("done"));
            inner.where_clause("score", ">", json!(6));
            inner.group(Logical::Or, &mut |last: &mut dyn PredicateSink| {
                last.where_clause("id", "=", json!(3));
                Ok(())
            })
        })
        .unwrap();
        assert_eq!(ids(&sink), vec![2, 3]);
    }

    #[test]
    fn failing_scope_records_nothing() {
        let mut sink = MemorySink::new();
        let result = sink.group(Logical::And, &mut |inner: &mut dyn PredicateSink| {
            inner.where_clause("a", "=", json!(1));
            Err(crate::FilterError::invalid_format("and.0", "boom"))
        });
        assert!(result.is_err());
        assert!(sink.predicates().is_empty());
    }

    #[test]
    fn orders_sort_results_with_nulls_last() {
        let mut sink = MemorySink::new();
        sink.order_by("score", Dir::Asc);
        assert_eq!(ids(&sink), vec![1, 2, 3]);

        let mut sink = MemorySink::new();
        sink.order_by("status", Dir::Desc);
        sink.order_by("id", Dir::Desc);
        assert_eq!(ids(&sink), vec![3, 1, 2]);
    }
}
