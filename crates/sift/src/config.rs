//! Declarative filter configuration.
//!
//! A [`FilterConfig`] describes a filter in YAML or JSON: the default
//! engine, per-engine validation options, relations, sanitizers, the header
//! override and sorting. [`Filter::from_config`](crate::Filter::from_config)
//! turns it into a filter builder, to which code-only parts (handlers,
//! custom sanitizers, custom engines) can still be added.
//!
//! ```yaml
//! default_engine: ruleset
//! filter_key: filter
//! field_map:
//!   state: status
//! relations:
//!   tags: [name]
//! sanitizers:
//!   title: [trim, lowercase]
//! defaults:
//!   allowed_fields: [status, title]
//! engines:
//!   tree:
//!     strict: true
//!     allowed_fields: ["*"]
//! header:
//!   enabled: true
//!   name: X-Filter-Mode
//!   allowed_engines: [tree, expression]
//!   fallback: error
//! sorting:
//!   allowed: [created_at, name]
//!   default: ["-created_at"]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::factory::HeaderSelector;
use crate::field::AllowedFields;
use crate::relation::RelationRules;
use crate::sanitize::{builtin, SanitizerPipeline};
use crate::settings::FilterSettings;
use crate::sorting::{OrderBy, SortRules};

fn default_engine() -> String {
    "ruleset".to_string()
}

fn default_sort_key() -> String {
    "sort".to_string()
}

fn default_operator() -> String {
    "eq".to_string()
}

/// Validation options for one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    pub strict: bool,
    pub allowed_fields: AllowedFields,
    /// Operator allow-list; empty means every registered operator.
    pub allowed_operators: Vec<String>,
    pub default_operator: String,
    pub ignore_empty_values: bool,
    pub reject_empty_values: bool,
    pub normalize_keys: bool,
    /// Known columns; `None` disables column validation.
    pub schema_columns: Option<Vec<String>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            strict: false,
            allowed_fields: AllowedFields::Unset,
            allowed_operators: Vec::new(),
            default_operator: default_operator(),
            ignore_empty_values: false,
            reject_empty_values: false,
            normalize_keys: false,
            schema_columns: None,
        }
    }
}

/// Sorting section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SortConfig {
    pub allowed: Vec<String>,
    /// Default orderings as `field` / `-field` tokens.
    pub default: Vec<String>,
    /// Alias → ordering tokens.
    pub aliases: BTreeMap<String, Vec<String>>,
    pub field_map: BTreeMap<String, String>,
    pub strict: bool,
}

fn parse_orders(tokens: &[String], context: &str) -> Result<Vec<OrderBy>> {
    tokens
        .iter()
        .map(|token| {
            OrderBy::parse(token)
                .ok_or_else(|| FilterError::Config(format!("{context}: invalid sort token '{token}'")))
        })
        .collect()
}

impl SortConfig {
    /// Builds the sort rules.
    pub fn rules(&self) -> Result<SortRules> {
        let mut rules = SortRules::new()
            .allow(self.allowed.iter().cloned())
            .strict(self.strict);
        for order in parse_orders(&self.default, "sorting.default")? {
            rules = rules.default_order(order);
        }
        for (alias, tokens) in &self.aliases {
            let orders = parse_orders(tokens, &format!("sorting.aliases.{alias}"))?;
            rules = rules.alias(alias, orders);
        }
        for (public, column) in &self.field_map {
            rules = rules.map_field(public, column);
        }
        Ok(rules)
    }
}

/// A complete filter definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    pub default_engine: String,
    /// Parameter holding the filter input; `None` reads the whole request.
    pub filter_key: Option<String>,
    pub sort_key: String,
    pub field_map: BTreeMap<String, String>,
    pub relations: RelationRules,
    /// Field (or `*`) → built-in sanitizer names, applied in order.
    pub sanitizers: BTreeMap<String, Vec<String>>,
    /// Options for engines without an entry in `engines`.
    pub defaults: EngineOptions,
    pub engines: BTreeMap<String, EngineOptions>,
    pub header: HeaderSelector,
    pub sorting: Option<SortConfig>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            default_engine: default_engine(),
            filter_key: None,
            sort_key: default_sort_key(),
            field_map: BTreeMap::new(),
            relations: RelationRules::default(),
            sanitizers: BTreeMap::new(),
            defaults: EngineOptions::default(),
            engines: BTreeMap::new(),
            header: HeaderSelector::default(),
            sorting: None,
        }
    }
}

impl FilterConfig {
    /// Parses a YAML configuration.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parses a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Options in effect for an engine.
    pub fn options_for(&self, engine: &str) -> &EngineOptions {
        self.engines
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(engine))
            .map(|(_, options)| options)
            .unwrap_or(&self.defaults)
    }

    /// Builds the sanitizer pipeline from built-in names.
    pub fn sanitizer_pipeline(&self) -> Result<SanitizerPipeline> {
        let mut pipeline = SanitizerPipeline::new();
        for (field, names) in &self.sanitizers {
            for name in names {
                let sanitizer = builtin(name).ok_or_else(|| {
                    FilterError::Config(format!("unknown sanitizer '{name}' for field '{field}'"))
                })?;
                pipeline = pipeline.add_shared(field, sanitizer);
            }
        }
        Ok(pipeline)
    }

    /// Builds the settings for an engine.
    pub fn settings_for(&self, engine: &str) -> Result<FilterSettings> {
        self.build_settings(self.options_for(engine))
    }

    /// Builds the settings from the `defaults` options.
    pub fn default_settings(&self) -> Result<FilterSettings> {
        self.build_settings(&self.defaults)
    }

    fn build_settings(&self, options: &EngineOptions) -> Result<FilterSettings> {
        let mut builder = FilterSettings::builder()
            .allowed_fields(options.allowed_fields.clone())
            .relations(self.relations.clone())
            .allow_operators(&options.allowed_operators)
            .sanitizers(self.sanitizer_pipeline()?)
            .field_map(self.field_map.clone())
            .strict(options.strict)
            .default_operator(&options.default_operator)
            .ignore_empty_values(options.ignore_empty_values)
            .reject_empty_values(options.reject_empty_values)
            .normalize_keys(options.normalize_keys);
        if let Some(columns) = &options.schema_columns {
            builder = builder.schema_columns(columns.iter().cloned());
        }
        builder.build()
    }

    /// Builds the sort rules, if sorting is configured.
    pub fn sort_rules(&self) -> Result<Option<SortRules>> {
        self.sorting.as_ref().map(SortConfig::rules).transpose()
    }
}
