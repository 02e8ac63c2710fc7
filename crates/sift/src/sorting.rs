//! Sorting: allowed sort fields, defaults and named aliases.
//!
//! Provides [`Dir`] for sort direction, [`OrderBy`] for field-based ordering
//! and [`SortRules`], which turns a request value such as
//! `"-created_at,name"` into validated orderings on a sink.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FilterError, Result};
use crate::field::{AllowedFields, FieldResolver};
use crate::sink::PredicateSink;
use crate::value::to_list;

/// Direction of an `order_by` call; serializes as `"asc"` / `"desc"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dir {
    #[default]
    Asc,
    /// Written as a leading `-` in the sort parameter.
    Desc,
}

impl Dir {
    /// Reverses `ordering` for [`Dir::Desc`].
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Dir::Asc => ordering,
            Dir::Desc => ordering.reverse(),
        }
    }
}

/// One resolved sort entry, handed to [`PredicateSink::order_by`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Column name after field mapping.
    pub field: String,
    #[serde(default)]
    pub dir: Dir,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        OrderBy {
            field: field.into(),
            dir: Dir::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderBy {
            field: field.into(),
            dir: Dir::Desc,
        }
    }

    pub fn new(field: impl Into<String>, dir: Dir) -> Self {
        OrderBy {
            field: field.into(),
            dir,
        }
    }

    /// Parses `field` (ascending) or `-field` (descending).
    ///
    /// Returns `None` for blank input.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        match token.strip_prefix('-') {
            Some(field) if !field.trim().is_empty() => Some(OrderBy::desc(field.trim())),
            Some(_) => None,
            None if token.is_empty() => None,
            None => Some(OrderBy::asc(token.trim_start_matches('+'))),
        }
    }
}

/// Sorting rules for a filter.
///
/// Mirrors the filter allow-list pattern: only allowed fields sort, aliases
/// expand to predefined orderings, and defaults apply when the request names
/// nothing usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortRules {
    allowed: AllowedFields,
    defaults: Vec<OrderBy>,
    aliases: BTreeMap<String, Vec<OrderBy>>,
    field_map: BTreeMap<String, String>,
    strict: bool,
}

impl SortRules {
    /// Creates rules that allow nothing.
    pub fn new() -> Self {
        SortRules::default()
    }

    /// Sets the sortable fields.
    pub fn allow<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = AllowedFields::from_names(fields);
        self
    }

    /// Appends a default ordering.
    pub fn default_order(mut self, order: OrderBy) -> Self {
        self.defaults.push(order);
        self
    }

    /// Registers a named alias that expands to fixed orderings.
    pub fn alias(mut self, name: &str, orders: Vec<OrderBy>) -> Self {
        self.aliases.insert(name.to_string(), orders);
        self
    }

    /// Maps a public sort name to a column.
    pub fn map_field(mut self, public: &str, column: &str) -> Self {
        self.field_map.insert(public.to_string(), column.to_string());
        self
    }

    /// Makes disallowed sort fields an error instead of a skip.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Resolves a request sort value into orderings.
    ///
    /// Accepts a comma-separated string or an array of tokens. Aliases expand
    /// in place; their orderings are trusted and skip the allow-list. When
    /// nothing usable remains the defaults are returned.
    pub fn resolve(&self, raw: Option<&Value>) -> Result<Vec<OrderBy>> {
        let resolver = FieldResolver::new(&self.allowed, &self.field_map, false);
        let mut orders = Vec::new();

        for token in raw.map(to_list).unwrap_or_default() {
            let Some(text) = token.as_str() else {
                continue;
            };
            if let Some(expanded) = self.aliases.get(text.trim()) {
                orders.extend(expanded.iter().cloned());
                continue;
            }
            let Some(order) = OrderBy::parse(text) else {
                continue;
            };
            if !resolver.is_allowed(&order.field) {
                if self.strict {
                    return Err(FilterError::not_allowed_field(order.field));
                }
                tracing::debug!(field = %order.field, "sort field not allowed, skipping");
                continue;
            }
            orders.push(OrderBy::new(resolver.resolve(&order.field), order.dir));
        }

        if orders.is_empty() {
            return Ok(self.defaults.clone());
        }
        Ok(orders)
    }

    /// Resolves and applies orderings to a sink, returning what was applied.
    pub fn apply(&self, raw: Option<&Value>, sink: &mut dyn PredicateSink) -> Result<Vec<OrderBy>> {
        let orders = self.resolve(raw)?;
        for order in &orders {
            sink.order_by(&order.field, order.dir);
        }
        Ok(orders)
    }
}
