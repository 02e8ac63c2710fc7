//! The immutable settings bag every engine resolves against.
//!
//! [`FilterSettings`] collects allowed fields, relation rules, operators,
//! sanitizers, field aliases and the strict/permissive switches. It is built
//! once (usually per filter definition) and only read afterwards, so a single
//! instance can back any number of runs.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::{FilterError, Result};
use crate::field::{AllowedFields, FieldResolver};
use crate::op::OperatorRegistry;
use crate::relation::{RelationPath, RelationRules};
use crate::sanitize::{Sanitizer, SanitizerPipeline};
use crate::value::is_empty_value;

/// What to do with an entry whose value is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyValue {
    /// Process it like any other value.
    Keep,
    /// Drop the entry.
    Skip,
}

/// Validation context shared by all engines.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    allowed_fields: AllowedFields,
    relations: RelationRules,
    allowed_operators: BTreeSet<String>,
    operators: OperatorRegistry,
    sanitizers: SanitizerPipeline,
    field_map: BTreeMap<String, String>,
    strict: bool,
    default_operator: String,
    ignore_empty_values: bool,
    reject_empty_values: bool,
    normalize_keys: bool,
    schema_columns: Option<BTreeSet<String>>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            allowed_fields: AllowedFields::Unset,
            relations: RelationRules::default(),
            allowed_operators: BTreeSet::new(),
            operators: OperatorRegistry::new(),
            sanitizers: SanitizerPipeline::new(),
            field_map: BTreeMap::new(),
            strict: false,
            default_operator: "eq".to_string(),
            ignore_empty_values: false,
            reject_empty_values: false,
            normalize_keys: false,
            schema_columns: None,
        }
    }
}

impl FilterSettings {
    /// Starts a settings builder.
    pub fn builder() -> FilterSettingsBuilder {
        FilterSettingsBuilder::default()
    }

    /// Returns the field allow-list.
    pub fn allowed_fields(&self) -> &AllowedFields {
        &self.allowed_fields
    }

    /// Returns the relation rules.
    pub fn relations(&self) -> &RelationRules {
        &self.relations
    }

    /// Returns the operator allow-list (empty = whole registry).
    pub fn allowed_operators(&self) -> &BTreeSet<String> {
        &self.allowed_operators
    }

    /// Returns the operator registry.
    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    /// Returns the sanitizer pipeline.
    pub fn sanitizers(&self) -> &SanitizerPipeline {
        &self.sanitizers
    }

    /// Returns the alias → column map.
    pub fn field_map(&self) -> &BTreeMap<String, String> {
        &self.field_map
    }

    /// Returns `true` in strict mode.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Returns the default operator token.
    pub fn default_operator(&self) -> &str {
        &self.default_operator
    }

    /// Returns `true` when empty values are dropped.
    pub fn ignores_empty_values(&self) -> bool {
        self.ignore_empty_values
    }

    /// Returns `true` when key normalization is on.
    pub fn normalizes_keys(&self) -> bool {
        self.normalize_keys
    }

    /// Returns the known schema columns, when column validation is on.
    pub fn schema_columns(&self) -> Option<&BTreeSet<String>> {
        self.schema_columns.as_ref()
    }

    /// Returns a field resolver over these settings.
    pub fn fields(&self) -> FieldResolver<'_> {
        FieldResolver::new(&self.allowed_fields, &self.field_map, self.normalize_keys)
    }

    /// Resolves an operator token to its native form.
    pub fn resolve_operator(&self, token: &str, field: Option<&str>) -> Result<String> {
        self.operators
            .resolve(token, &self.allowed_operators, self.strict, field)
    }

    /// Native form of the default operator.
    pub fn default_native(&self) -> &str {
        self.operators.default_native()
    }

    /// Runs the sanitizers for an incoming field name.
    ///
    /// The name is normalized first. When it is an alias, the chain of the
    /// column it maps to runs after the alias's own chain, so neither case
    /// nor aliasing escapes a column's sanitizers.
    pub fn sanitize(&self, field: &str, value: Value) -> Result<Value> {
        let fields = self.fields();
        let key = fields.normalize(field);
        let value = self.sanitizers.handle(&key, value)?;
        let column = fields.resolve(&key);
        if column == key {
            return Ok(value);
        }
        self.sanitizers.handle_own(&column, value)
    }

    /// Validates a relation + terminal field combination.
    pub fn check_relation(&self, path: &RelationPath, terminal: &str) -> Result<bool> {
        self.relations.validate(path, terminal, self.strict)
    }

    /// Validates a column against the known schema.
    ///
    /// Always passes when no schema is configured.
    pub fn check_column(&self, column: &str) -> Result<bool> {
        match &self.schema_columns {
            None => Ok(true),
            Some(columns) if columns.contains(column) => Ok(true),
            Some(_) if self.strict => Err(FilterError::not_allowed_field(column)),
            Some(_) => {
                tracing::debug!(column, "column not in schema, skipping");
                Ok(false)
            }
        }
    }

    /// Applies the empty-value policy to an entry.
    ///
    /// Ignoring wins over rejecting: rejection only applies when empty values
    /// are not ignored.
    pub fn empty_value(&self, field: &str, value: &Value) -> Result<EmptyValue> {
        if !is_empty_value(value) {
            return Ok(EmptyValue::Keep);
        }
        if self.ignore_empty_values {
            return Ok(EmptyValue::Skip);
        }
        if self.reject_empty_values {
            return Err(FilterError::NotAllowedEmptyValue {
                field: field.to_string(),
            });
        }
        Ok(EmptyValue::Keep)
    }
}

/// Builder for [`FilterSettings`].
///
/// # Example
///
/// ```
/// use sift::{FilterSettings, RelationRules};
/// use sift::sanitize::Trim;
///
/// let settings = FilterSettings::builder()
///     .allow_fields(["status", "title"])
///     .relations(RelationRules::list(["tags"]))
///     .allow_operators(["eq", "like"])
///     .sanitize("title", Trim)
///     .strict(true)
///     .build()
///     .unwrap();
///
/// assert!(settings.is_strict());
/// ```
#[derive(Debug, Default)]
pub struct FilterSettingsBuilder {
    settings: FilterSettings,
}

impl FilterSettingsBuilder {
    /// Sets the allowed fields. `*` allows every field.
    pub fn allow_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.allowed_fields = AllowedFields::from_names(fields);
        self
    }

    /// Allows every field.
    pub fn allow_any_field(mut self) -> Self {
        self.settings.allowed_fields = AllowedFields::Any;
        self
    }

    /// Sets the allow-list directly.
    pub fn allowed_fields(mut self, allowed: AllowedFields) -> Self {
        self.settings.allowed_fields = allowed;
        self
    }

    /// Sets the relation rules.
    pub fn relations(mut self, relations: RelationRules) -> Self {
        self.settings.relations = relations;
        self
    }

    /// Narrows the operator registry to these tokens.
    pub fn allow_operators<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.settings.allowed_operators = tokens
            .into_iter()
            .map(|t| t.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Replaces the operator registry.
    pub fn operators(mut self, registry: OperatorRegistry) -> Self {
        self.settings.operators = registry;
        self
    }

    /// Appends a sanitizer for a field (`*` for every field).
    pub fn sanitize<S: Sanitizer + 'static>(mut self, field: &str, sanitizer: S) -> Self {
        self.settings.sanitizers = self.settings.sanitizers.add(field, sanitizer);
        self
    }

    /// Replaces the sanitizer pipeline.
    pub fn sanitizers(mut self, pipeline: SanitizerPipeline) -> Self {
        self.settings.sanitizers = pipeline;
        self
    }

    /// Maps a public field name to a column.
    pub fn map_field(mut self, alias: &str, column: &str) -> Self {
        self.settings
            .field_map
            .insert(alias.to_string(), column.to_string());
        self
    }

    /// Adds several alias → column mappings.
    pub fn field_map<I, K, V>(mut self, map: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.settings
            .field_map
            .extend(map.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Strict mode raises on disallowed fields and operators.
    pub fn strict(mut self, strict: bool) -> Self {
        self.settings.strict = strict;
        self
    }

    /// Sets the default operator token.
    pub fn default_operator(mut self, token: &str) -> Self {
        self.settings.default_operator = token.to_ascii_lowercase();
        self
    }

    /// Drops entries with empty values.
    ///
    /// Empty means null, a blank string, `[]` or `{}`. This is narrower than
    /// "falsy": `0`, `false` and `"0"` are kept as filter values.
    pub fn ignore_empty_values(mut self, ignore: bool) -> Self {
        self.settings.ignore_empty_values = ignore;
        self
    }

    /// Rejects entries with empty values (unless they are ignored).
    pub fn reject_empty_values(mut self, reject: bool) -> Self {
        self.settings.reject_empty_values = reject;
        self
    }

    /// Lower-cases incoming field names before lookup.
    pub fn normalize_keys(mut self, normalize: bool) -> Self {
        self.settings.normalize_keys = normalize;
        self
    }

    /// Enables column validation against a known schema.
    pub fn schema_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.schema_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Finalizes the settings.
    ///
    /// Fails with [`FilterError::InvalidOperator`] when the default operator
    /// is not a registered token.
    pub fn build(mut self) -> Result<FilterSettings> {
        let default = self.settings.default_operator.clone();
        if !self.settings.operators.contains(&default) {
            return Err(FilterError::invalid_operator(default, None));
        }
        self.settings.operators = self.settings.operators.with_default(&default);
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let settings = FilterSettings::builder().build().unwrap();
        assert!(!settings.is_strict());
        assert_eq!(settings.default_operator(), "eq");
        assert_eq!(settings.default_native(), "=");
        assert_eq!(settings.allowed_fields(), &AllowedFields::Unset);
    }

    #[test]
    fn default_operator_drives_registry_fallback() {
        let settings = FilterSettings::builder()
            .default_operator("LIKE")
            .allow_operators(["eq"])
            .build()
            .unwrap();
        assert_eq!(settings.resolve_operator("gt", None).unwrap(), "like");
    }

    #[test]
    fn unknown_default_operator_fails() {
        let err = FilterSettings::builder()
            .default_operator("approx")
            .build()
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidOperator { .. }));
    }

    #[test]
    fn empty_value_policy() {
        let keep = FilterSettings::builder().build().unwrap();
        assert_eq!(keep.empty_value("a", &json!("")).unwrap(), EmptyValue::Keep);

        let skip = FilterSettings::builder()
            .ignore_empty_values(true)
            .reject_empty_values(true)
            .build()
            .unwrap();
        assert_eq!(skip.empty_value("a", &json!("")).unwrap(), EmptyValue::Skip);
        assert_eq!(skip.empty_value("a", &json!("x")).unwrap(), EmptyValue::Keep);
        for value in [json!(0), json!(false), json!("0")] {
            assert_eq!(skip.empty_value("a", &value).unwrap(), EmptyValue::Keep);
        }

        let reject = FilterSettings::builder()
            .reject_empty_values(true)
            .build()
            .unwrap();
        assert!(matches!(
            reject.empty_value("a", &json!(null)),
            Err(FilterError::NotAllowedEmptyValue { ref field }) if field == "a"
        ));
    }

    #[test]
    fn sanitizers_follow_normalized_keys_and_aliases() {
        use crate::sanitize::{Lowercase, Trim};

        let settings = FilterSettings::builder()
            .normalize_keys(true)
            .map_field("state", "status")
            .sanitize("status", Lowercase)
            .sanitize("state", Trim)
            .build()
            .unwrap();

        assert_eq!(settings.sanitize("STATUS", json!("ACTIVE")).unwrap(), json!("active"));
        assert_eq!(settings.sanitize("State", json!(" ACTIVE ")).unwrap(), json!("active"));

        let case_sensitive = FilterSettings::builder()
            .sanitize("status", Lowercase)
            .build()
            .unwrap();
        assert_eq!(case_sensitive.sanitize("STATUS", json!("ACTIVE")).unwrap(), json!("ACTIVE"));
    }

    #[test]
    fn schema_columns() {
        let settings = FilterSettings::builder()
            .schema_columns(["status"])
            .build()
            .unwrap();
        assert!(settings.check_column("status").unwrap());
        assert!(!settings.check_column("ghost").unwrap());

        let strict = FilterSettings::builder()
            .schema_columns(["status"])
            .strict(true)
            .build()
            .unwrap();
        assert!(strict.check_column("ghost").is_err());

        let open = FilterSettings::builder().build().unwrap();
        assert!(open.check_column("anything").unwrap());
    }
}
