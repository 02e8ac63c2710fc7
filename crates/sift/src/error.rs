//! Error types for the sift crate.
//!
//! Every variant is a rejection of untrusted input or of a misconfigured
//! filter. None of them are transient, so nothing here is retriable.

use thiserror::Error;

/// Errors raised while resolving or applying a filter.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Field (or relation + field combination) is not in the allow-list.
    #[error("{}", not_allowed_field_message(.field, .relation.as_deref()))]
    NotAllowedField {
        field: String,
        relation: Option<String>,
    },

    /// Operator token is outside the effective operator set.
    #[error("operator '{operator}' is not allowed{}", on_field(.field.as_deref()))]
    InvalidOperator {
        operator: String,
        field: Option<String>,
    },

    /// Structurally malformed filter input.
    #[error("invalid filter data at '{path}': {reason}")]
    InvalidDataFormat { path: String, reason: String },

    /// No engine registered under the requested name or alias.
    #[error("unknown filter engine '{0}'")]
    UnknownEngine(String),

    /// Empty value supplied while empty values are rejected.
    #[error("empty value is not allowed for field '{field}'")]
    NotAllowedEmptyValue { field: String },

    /// Header-driven engine override named an engine that may not be used.
    #[error("engine '{value}' requested through header '{header}' is not allowed")]
    EngineNotAllowed { header: String, value: String },

    /// A handler name collides with a reserved filter method name.
    #[error("handler name '{0}' is reserved")]
    ReservedHandlerName(String),

    /// A sanitizer failed. This is a misconfiguration, not a per-value skip.
    #[error("sanitizer failed for field '{field}': {message}")]
    Sanitize { field: String, message: String },

    /// Configuration parsed but is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration could not be parsed as YAML.
    #[error("invalid YAML configuration: {0}")]
    ConfigYaml(#[from] serde_yaml::Error),

    /// Configuration or input could not be parsed as JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn not_allowed_field_message(field: &str, relation: Option<&str>) -> String {
    match relation {
        Some(relation) => format!("field '{field}' is not allowed on relation '{relation}'"),
        None => format!("field '{field}' is not allowed"),
    }
}

fn on_field(field: Option<&str>) -> String {
    field.map(|f| format!(" on field '{f}'")).unwrap_or_default()
}

impl FilterError {
    /// Create a not-allowed-field error for a top-level field.
    pub fn not_allowed_field(field: impl Into<String>) -> Self {
        Self::NotAllowedField {
            field: field.into(),
            relation: None,
        }
    }

    /// Create a not-allowed-field error for a field reached through a relation.
    pub fn not_allowed_relation(relation: impl Into<String>, field: impl Into<String>) -> Self {
        Self::NotAllowedField {
            field: field.into(),
            relation: Some(relation.into()),
        }
    }

    /// Create an invalid-operator error.
    pub fn invalid_operator(operator: impl Into<String>, field: Option<&str>) -> Self {
        Self::InvalidOperator {
            operator: operator.into(),
            field: field.map(String::from),
        }
    }

    /// Create an invalid-data-format error.
    pub fn invalid_format(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDataFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that strict mode raises and permissive mode
    /// swallows.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FilterError::NotAllowedField { .. } | FilterError::InvalidOperator { .. }
        )
    }
}

/// Result type for sift operations.
pub type Result<T> = std::result::Result<T, FilterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        assert_eq!(
            FilterError::not_allowed_field("secret").to_string(),
            "field 'secret' is not allowed"
        );
        assert_eq!(
            FilterError::not_allowed_relation("tags", "id").to_string(),
            "field 'id' is not allowed on relation 'tags'"
        );
        assert_eq!(
            FilterError::invalid_operator("xx", Some("status")).to_string(),
            "operator 'xx' is not allowed on field 'status'"
        );
        assert_eq!(
            FilterError::invalid_operator("xx", None).to_string(),
            "operator 'xx' is not allowed"
        );
    }

    #[test]
    fn recoverable_errors() {
        assert!(FilterError::not_allowed_field("a").is_recoverable());
        assert!(FilterError::invalid_operator("a", None).is_recoverable());
        assert!(!FilterError::invalid_format("and.0", "missing field").is_recoverable());
        assert!(!FilterError::UnknownEngine("x".into()).is_recoverable());
    }
}
