//! Field allow-lists and alias resolution.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};

/// Which fields a filter accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum AllowedFields {
    /// Every field is accepted (configured as `["*"]`).
    Any,
    /// Only the listed fields are accepted. An empty set accepts nothing.
    Only(BTreeSet<String>),
    /// No field list configured; behaves like an empty `Only`.
    #[default]
    Unset,
}

impl AllowedFields {
    /// Builds an allow-list from names. A lone `*` means [`AllowedFields::Any`].
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.contains("*") {
            AllowedFields::Any
        } else {
            AllowedFields::Only(names)
        }
    }

    /// Returns `true` if the field is accepted.
    pub fn contains(&self, field: &str) -> bool {
        match self {
            AllowedFields::Any => true,
            AllowedFields::Only(names) => names.contains(field),
            AllowedFields::Unset => false,
        }
    }

    /// Returns `true` for the wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, AllowedFields::Any)
    }
}

impl From<Vec<String>> for AllowedFields {
    fn from(names: Vec<String>) -> Self {
        AllowedFields::from_names(names)
    }
}

impl From<AllowedFields> for Vec<String> {
    fn from(allowed: AllowedFields) -> Self {
        match allowed {
            AllowedFields::Any => vec!["*".to_string()],
            AllowedFields::Only(names) => names.into_iter().collect(),
            AllowedFields::Unset => Vec::new(),
        }
    }
}

/// Validates incoming field names and maps aliases to real columns.
///
/// The resolver borrows its rules from [`FilterSettings`](crate::FilterSettings)
/// for the duration of one run.
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver<'a> {
    allowed: &'a AllowedFields,
    field_map: &'a BTreeMap<String, String>,
    normalize_keys: bool,
}

impl<'a> FieldResolver<'a> {
    /// Creates a resolver over the given rules.
    pub fn new(
        allowed: &'a AllowedFields,
        field_map: &'a BTreeMap<String, String>,
        normalize_keys: bool,
    ) -> Self {
        FieldResolver {
            allowed,
            field_map,
            normalize_keys,
        }
    }

    /// Applies key normalization (lower-casing, when enabled).
    pub fn normalize(&self, raw: &str) -> String {
        if self.normalize_keys {
            raw.to_lowercase()
        } else {
            raw.to_string()
        }
    }

    /// Maps a public name to its column: `field_map[raw] ?? raw`.
    pub fn resolve(&self, raw: &str) -> String {
        self.field_map
            .get(raw)
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    /// Returns `true` if the field (or the column it maps to) is allowed.
    pub fn is_allowed(&self, field: &str) -> bool {
        self.allowed.contains(field) || self.allowed.contains(&self.resolve(field))
    }

    /// Normalizes, validates and maps a raw field name.
    ///
    /// Returns `Ok(None)` when the field is not allowed in permissive mode, so
    /// the entry contributes nothing. Strict mode raises
    /// [`FilterError::NotAllowedField`].
    pub fn check(&self, raw: &str, strict: bool) -> Result<Option<String>> {
        let field = self.normalize(raw);
        if field.is_empty() {
            return if strict {
                Err(FilterError::not_allowed_field(raw))
            } else {
                Ok(None)
            };
        }
        if self.is_allowed(&field) {
            return Ok(Some(self.resolve(&field)));
        }
        if strict {
            return Err(FilterError::not_allowed_field(field));
        }
        tracing::debug!(field = %field, "field not allowed, skipping");
        Ok(None)
    }
}
