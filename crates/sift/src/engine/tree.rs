//! Nested AND/OR logic trees.
//!
//! ```json
//! {"and": [
//!   {"field": "status", "operator": "eq", "value": "stopped"},
//!   {"or": [
//!     {"field": "status", "operator": "eq", "value": "active"},
//!     {"field": "status", "operator": "eq", "value": "pending"}
//!   ]}
//! ]}
//! ```
//!
//! The whole tree is parsed before anything reaches the sink: a malformed
//! node anywhere fails the run with [`FilterError::InvalidDataFormat`]
//! regardless of strict mode.

use serde_json::{Map, Value};

use super::{emit, resolve_target, skip, Engine, FilterRun};
use crate::context::SkipReason;
use crate::error::{FilterError, Result};
use crate::settings::EmptyValue;
use crate::sink::{Logical, PredicateSink};

/// A parsed logic tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    /// Children combined with a logical operator.
    Group {
        logical: Logical,
        children: Vec<TreeNode>,
    },
    /// A leaf condition.
    Condition {
        field: String,
        operator: String,
        value: Value,
    },
}

impl TreeNode {
    /// Parses a tree from its JSON form.
    pub fn parse(value: &Value) -> Result<TreeNode> {
        parse_node(value, "$")
    }

    /// Parses the root object of a run's input.
    pub fn parse_root(input: &Map<String, Value>) -> Result<TreeNode> {
        parse_object(input, "$")
    }

    /// Number of leaf conditions in the tree.
    pub fn conditions(&self) -> usize {
        match self {
            TreeNode::Condition { .. } => 1,
            TreeNode::Group { children, .. } => children.iter().map(TreeNode::conditions).sum(),
        }
    }

    /// Serializes the node back into tree input.
    pub fn to_json(&self) -> Value {
        match self {
            TreeNode::Condition {
                field,
                operator,
                value,
            } => serde_json::json!({"field": field, "operator": operator, "value": value}),
            TreeNode::Group { logical, children } => {
                let mut map = Map::new();
                map.insert(
                    logical.as_str().to_string(),
                    Value::Array(children.iter().map(TreeNode::to_json).collect()),
                );
                Value::Object(map)
            }
        }
    }
}

fn parse_node(value: &Value, path: &str) -> Result<TreeNode> {
    match value {
        Value::Object(map) => parse_object(map, path),
        _ => Err(FilterError::invalid_format(path, "expected an object")),
    }
}

fn parse_object(map: &Map<String, Value>, path: &str) -> Result<TreeNode> {
    if map.contains_key("field") {
        return parse_condition(map, path);
    }

    let mut groups = Vec::new();
    for (key, value) in map {
        let Some(logical) = Logical::from_key(key) else {
            return Err(FilterError::invalid_format(
                path,
                format!("unexpected key `{key}`, expected `and`, `or` or a condition"),
            ));
        };
        let child_path = format!("{path}.{}", logical.as_str());
        let Value::Array(items) = value else {
            return Err(FilterError::invalid_format(child_path, "expected an array"));
        };
        let children = items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_node(item, &format!("{child_path}[{i}]")))
            .collect::<Result<Vec<_>>>()?;
        groups.push(TreeNode::Group { logical, children });
    }

    match groups.len() {
        0 => Ok(TreeNode::Group {
            logical: Logical::And,
            children: Vec::new(),
        }),
        1 => Ok(groups.remove(0)),
        _ => Ok(TreeNode::Group {
            logical: Logical::And,
            children: groups,
        }),
    }
}

fn parse_condition(map: &Map<String, Value>, path: &str) -> Result<TreeNode> {
    let field = match map.get("field") {
        Some(Value::String(field)) if !field.trim().is_empty() => field.clone(),
        _ => return Err(FilterError::invalid_format(path, "`field` must be a non-empty string")),
    };
    let operator = match map.get("operator") {
        Some(Value::String(op)) if !op.trim().is_empty() => op.clone(),
        Some(_) => return Err(FilterError::invalid_format(path, "`operator` must be a string")),
        None => return Err(FilterError::invalid_format(path, "condition is missing `operator`")),
    };
    let Some(value) = map.get("value") else {
        return Err(FilterError::invalid_format(path, "condition is missing `value`"));
    };
    if let Some(extra) = map
        .keys()
        .find(|k| !matches!(k.as_str(), "field" | "operator" | "value"))
    {
        return Err(FilterError::invalid_format(
            path,
            format!("unexpected key `{extra}` in condition"),
        ));
    }
    Ok(TreeNode::Condition {
        field,
        operator,
        value: value.clone(),
    })
}

/// The logic tree engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeEngine;

impl TreeEngine {
    pub const NAME: &'static str = "tree";

    fn apply_node(
        &self,
        node: &TreeNode,
        run: &mut FilterRun<'_>,
        sink: &mut dyn PredicateSink,
    ) -> Result<()> {
        match node {
            // An empty group constrains nothing.
            TreeNode::Group { children, .. } if children.is_empty() => Ok(()),
            TreeNode::Group { logical, children } => {
                sink.group(*logical, &mut |inner: &mut dyn PredicateSink| {
                    for child in children {
                        self.apply_node(child, run, inner)?;
                    }
                    Ok(())
                })
            }
            TreeNode::Condition {
                field,
                operator,
                value,
            } => self.apply_condition(field, operator, value, run, sink),
        }
    }

    fn apply_condition(
        &self,
        field: &str,
        operator: &str,
        value: &Value,
        run: &mut FilterRun<'_>,
        sink: &mut dyn PredicateSink,
    ) -> Result<()> {
        let settings = run.settings;
        if settings.empty_value(field, value)? == EmptyValue::Skip {
            skip(run.context, field, SkipReason::EmptyValue);
            return Ok(());
        }
        let Some(target) = resolve_target(settings, field, true)? else {
            skip(run.context, field, SkipReason::NotAllowed);
            return Ok(());
        };
        let native = settings.resolve_operator(operator, Some(field))?;
        let value = settings.sanitize(field, value.clone())?;
        emit(target, native, value, sink, run.context)
    }
}

impl Engine for TreeEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, run: &mut FilterRun<'_>, sink: &mut dyn PredicateSink) -> Result<()> {
        if run.input.is_empty() {
            return Ok(());
        }
        let tree = TreeNode::parse_root(run.input)?;
        tracing::debug!(conditions = tree.conditions(), "tree parsed");
        match tree {
            // An OR root must not OR-join predicates already on the sink.
            TreeNode::Group {
                logical: Logical::Or,
                ref children,
            } if !children.is_empty() => {
                sink.group(Logical::And, &mut |inner: &mut dyn PredicateSink| {
                    self.apply_node(&tree, run, inner)
                })
            }
            _ => self.apply_node(&tree, run, sink),
        }
    }
}
