//! Dotted relation paths and relation allow-lists.
//!
//! A field such as `author.profile.name` reaches `name` through the
//! `author` → `profile` relation chain. [`RelationPath`] splits the path,
//! [`RelationRules`] decides whether the chain (and terminal field) may be
//! queried, and [`RelationPath::nest`] builds the nested `where_has` calls.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::sink::PredicateSink;

/// A relation chain plus the field it ends in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationPath {
    hops: Vec<String>,
}

impl RelationPath {
    /// Splits a dotted path into `(relation chain, terminal field)`.
    ///
    /// Returns `(None, path)` when the path has no dot.
    pub fn split(path: &str) -> (Option<RelationPath>, String) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let terminal = segments.pop().unwrap_or_default().to_string();
        if segments.is_empty() {
            return (None, terminal);
        }
        let hops = segments.into_iter().map(String::from).collect();
        (Some(RelationPath { hops }), terminal)
    }

    /// Creates a path from its hops.
    pub fn from_hops<I, S>(hops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RelationPath {
            hops: hops.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the individual relation hops.
    pub fn hops(&self) -> &[String] {
        &self.hops
    }

    /// Returns the chain joined with dots (`author.profile`).
    pub fn chain(&self) -> String {
        self.hops.join(".")
    }

    /// Builds nested `where_has` scopes, one per hop, and runs `inner` in the
    /// innermost one.
    pub fn nest(
        &self,
        sink: &mut dyn PredicateSink,
        inner: &mut dyn FnMut(&mut dyn PredicateSink) -> Result<()>,
    ) -> Result<()> {
        nest_hops(&self.hops, sink, inner)
    }
}

fn nest_hops(
    hops: &[String],
    sink: &mut dyn PredicateSink,
    inner: &mut dyn FnMut(&mut dyn PredicateSink) -> Result<()>,
) -> Result<()> {
    match hops.split_first() {
        None => inner(sink),
        Some((hop, rest)) => sink.where_has(hop, &mut |nested: &mut dyn PredicateSink| {
            nest_hops(rest, nested, inner)
        }),
    }
}

impl std::fmt::Display for RelationPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.chain())
    }
}

/// Which relations (and relation fields) may be queried.
///
/// Configured either as a flat list (`["tags", "author.profile"]`), where any
/// field of a listed relation is allowed, or as a field-scoped map
/// (`{"tags": ["name"]}`), where the terminal field must be listed too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationRules {
    /// Relation chains only; any terminal field is allowed.
    List(BTreeSet<String>),
    /// Relation chain → allowed terminal fields. `*` allows every field.
    Scoped(BTreeMap<String, BTreeSet<String>>),
}

impl Default for RelationRules {
    fn default() -> Self {
        RelationRules::List(BTreeSet::new())
    }
}

impl RelationRules {
    /// Builds a flat relation list.
    pub fn list<I, S>(relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RelationRules::List(relations.into_iter().map(Into::into).collect())
    }

    /// Builds an empty field-scoped map; add entries with [`scope`](Self::scope).
    pub fn scoped() -> Self {
        RelationRules::Scoped(BTreeMap::new())
    }

    /// Adds a relation with its allowed fields, converting a list into a map
    /// (existing list entries allow every field).
    pub fn scope<I, S>(self, relation: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = match self {
            RelationRules::Scoped(map) => map,
            RelationRules::List(list) => list
                .into_iter()
                .map(|rel| (rel, BTreeSet::from(["*".to_string()])))
                .collect(),
        };
        map.insert(
            relation.to_string(),
            fields.into_iter().map(Into::into).collect(),
        );
        RelationRules::Scoped(map)
    }

    /// Returns `true` when no relation is declared.
    pub fn is_empty(&self) -> bool {
        match self {
            RelationRules::List(list) => list.is_empty(),
            RelationRules::Scoped(map) => map.is_empty(),
        }
    }

    /// Returns `true` if `terminal` may be queried through `path`.
    pub fn allows(&self, path: &RelationPath, terminal: &str) -> bool {
        let chain = path.chain();
        match self {
            RelationRules::List(list) => list.contains(&chain),
            RelationRules::Scoped(map) => map
                .get(&chain)
                .map(|fields| fields.contains(terminal) || fields.contains("*"))
                .unwrap_or(false),
        }
    }

    /// Validates a relation + field combination.
    ///
    /// Strict mode raises [`FilterError::NotAllowedField`] carrying the
    /// relation. Permissive mode returns `Ok(false)` so the caller drops the
    /// clause.
    pub fn validate(&self, path: &RelationPath, terminal: &str, strict: bool) -> Result<bool> {
        if self.allows(path, terminal) {
            return Ok(true);
        }
        if strict {
            return Err(FilterError::not_allowed_relation(path.chain(), terminal));
        }
        tracing::debug!(relation = %path, field = terminal, "relation not allowed, skipping");
        Ok(false)
    }
}
