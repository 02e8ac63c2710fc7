//! Operator tokens and the operator registry.
//!
//! Requests name operators with short symbolic tokens (`eq`, `gt`, `like`).
//! The [`OperatorRegistry`] maps each token to the operator a predicate sink
//! understands (`=`, `>`, `like`) and decides which tokens a filter accepts.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;

use crate::error::{FilterError, Result};

/// Built-in operator token.
///
/// Operators are grouped by what they compare:
/// - **Equality**: `Eq`, `Neq`
/// - **Ordering**: `Gt`, `Gte`, `Lt`, `Lte`, `Between`
/// - **Pattern**: `Like`, `NotLike`
/// - **Membership**: `In`, `NotIn`
/// - **Null checks**: `Null`, `NotNull`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// SQL-style pattern match (`%` and `_` wildcards).
    Like,
    /// Negated pattern match.
    NotLike,
    /// Value is one of a set.
    In,
    /// Value is none of a set.
    NotIn,
    /// Value lies in an inclusive `[low, high]` range.
    Between,
    /// Value is null.
    Null,
    /// Value is not null.
    NotNull,
}

impl Op {
    /// Every built-in operator, in registry order.
    pub const ALL: [Op; 13] = [
        Op::Eq,
        Op::Neq,
        Op::Gt,
        Op::Gte,
        Op::Lt,
        Op::Lte,
        Op::Like,
        Op::NotLike,
        Op::In,
        Op::NotIn,
        Op::Between,
        Op::Null,
        Op::NotNull,
    ];

    /// Returns the request-side token for this operator.
    pub fn token(self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Neq => "neq",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Lt => "lt",
            Op::Lte => "lte",
            Op::Like => "like",
            Op::NotLike => "nlike",
            Op::In => "in",
            Op::NotIn => "nin",
            Op::Between => "between",
            Op::Null => "null",
            Op::NotNull => "notnull",
        }
    }

    /// Returns the sink-native operator.
    pub fn native(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Neq => "!=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Like => "like",
            Op::NotLike => "not like",
            Op::In => "in",
            Op::NotIn => "not in",
            Op::Between => "between",
            Op::Null => "is null",
            Op::NotNull => "is not null",
        }
    }

    /// Looks up a built-in operator by token (case-insensitive).
    pub fn from_token(token: &str) -> Option<Op> {
        let token = token.to_ascii_lowercase();
        Op::ALL.into_iter().find(|op| op.token() == token)
    }

    /// Looks up a built-in operator by its native form.
    pub fn from_native(native: &str) -> Option<Op> {
        let native = native.to_ascii_lowercase();
        Op::ALL.into_iter().find(|op| op.native() == native)
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

static BUILTIN: Lazy<BTreeMap<String, String>> = Lazy::new(|| {
    Op::ALL
        .into_iter()
        .map(|op| (op.token().to_string(), op.native().to_string()))
        .collect()
});

/// Maps operator tokens to sink-native operators.
///
/// The registry holds the full token set (built-ins plus anything added with
/// [`register`](Self::register)) and a default token used by permissive
/// resolution. Narrowing is applied per lookup through an allow-list: an empty
/// allow-list means the whole registry is in effect, otherwise only tokens in
/// `registry ∩ allow-list` resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorRegistry {
    operators: BTreeMap<String, String>,
    default: String,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        OperatorRegistry {
            operators: BUILTIN.clone(),
            default: Op::Eq.token().to_string(),
        }
    }
}

impl OperatorRegistry {
    /// Creates a registry holding the built-in operators, defaulting to `eq`.
    pub fn new() -> Self {
        OperatorRegistry::default()
    }

    /// Creates a registry with no operators at all.
    ///
    /// The default token must be registered before the registry is useful.
    pub fn empty(default: &str) -> Self {
        OperatorRegistry {
            operators: BTreeMap::new(),
            default: default.to_ascii_lowercase(),
        }
    }

    /// Registers (or replaces) a token.
    pub fn register(mut self, token: &str, native: impl Into<String>) -> Self {
        self.operators
            .insert(token.to_ascii_lowercase(), native.into());
        self
    }

    /// Sets the default token used by permissive resolution.
    pub fn with_default(mut self, token: &str) -> Self {
        self.default = token.to_ascii_lowercase();
        self
    }

    /// Returns the default token.
    pub fn default_token(&self) -> &str {
        &self.default
    }

    /// Returns the native form of the default token.
    ///
    /// Falls back to `=` when the default token is not registered.
    pub fn default_native(&self) -> &str {
        self.operators
            .get(&self.default)
            .map(String::as_str)
            .unwrap_or("=")
    }

    /// Returns `true` if the token exists in the registry.
    pub fn contains(&self, token: &str) -> bool {
        self.operators.contains_key(&token.to_ascii_lowercase())
    }

    /// Returns `true` if the token is valid under the given allow-list.
    pub fn is_allowed(&self, token: &str, allow: &BTreeSet<String>) -> bool {
        let token = token.to_ascii_lowercase();
        self.operators.contains_key(&token) && (allow.is_empty() || allow.contains(&token))
    }

    /// Returns the native form of a token if it is registered, ignoring any
    /// allow-list.
    pub fn native(&self, token: &str) -> Option<&str> {
        self.operators
            .get(&token.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Resolves a token to its native operator.
    ///
    /// Tokens outside the effective set raise [`FilterError::InvalidOperator`]
    /// in strict mode and resolve to the default token's native form otherwise.
    pub fn resolve(
        &self,
        token: &str,
        allow: &BTreeSet<String>,
        strict: bool,
        field: Option<&str>,
    ) -> Result<String> {
        if self.is_allowed(token, allow) {
            let native = self
                .native(token)
                .unwrap_or_else(|| self.default_native());
            return Ok(native.to_string());
        }
        if strict {
            return Err(FilterError::invalid_operator(token, field));
        }
        tracing::debug!(
            operator = token,
            fallback = %self.default,
            "operator not allowed, using default"
        );
        Ok(self.default_native().to_string())
    }

    /// Returns the effective token → native map under an allow-list.
    pub fn all(&self, allow: &BTreeSet<String>) -> BTreeMap<String, String> {
        self.operators
            .iter()
            .filter(|(token, _)| allow.is_empty() || allow.contains(*token))
            .map(|(token, native)| (token.clone(), native.clone()))
            .collect()
    }
}
