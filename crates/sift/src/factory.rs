//! Engine registry and header-driven engine selection.
//!
//! [`EngineFactory`] maps engine names to constructors: the four built-ins
//! plus anything registered with [`EngineFactory::extend`].
//! [`HeaderSelector`] lets a request pick its engine through a header,
//! constrained by an allow-list and an alias map.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::{Engine, ExpressionEngine, InvokableEngine, RulesetEngine, TreeEngine};
use crate::error::{FilterError, Result};
use crate::input::Headers;

type Constructor = Arc<dyn Fn() -> Box<dyn Engine> + Send + Sync>;

/// Builds engines by name.
///
/// # Example
///
/// ```
/// use sift::{EngineFactory, RulesetEngine};
///
/// let factory = EngineFactory::new().extend("flat", || Box::new(RulesetEngine));
/// assert_eq!(factory.generate("Flat").unwrap().name(), "ruleset");
/// assert!(factory.generate("graph").is_err());
/// ```
#[derive(Clone, Default)]
pub struct EngineFactory {
    custom: BTreeMap<String, Constructor>,
}

impl EngineFactory {
    /// Names of the built-in engines.
    pub const BUILTIN: [&'static str; 4] = [
        RulesetEngine::NAME,
        TreeEngine::NAME,
        ExpressionEngine::NAME,
        InvokableEngine::NAME,
    ];

    /// Creates a factory with the built-in engines only.
    pub fn new() -> Self {
        EngineFactory::default()
    }

    /// Registers a custom engine (or alias) under `name`.
    ///
    /// Custom registrations shadow built-ins of the same name.
    pub fn extend<F>(mut self, name: &str, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Engine> + Send + Sync + 'static,
    {
        self.custom
            .insert(name.to_ascii_lowercase(), Arc::new(constructor));
        self
    }

    /// Returns `true` if an engine exists under `name`.
    pub fn contains(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.custom.contains_key(&name) || Self::BUILTIN.contains(&name.as_str())
    }

    /// All known engine names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = Self::BUILTIN.iter().map(|n| n.to_string()).collect();
        for name in self.custom.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Builds the engine registered under `name` (case-insensitive).
    pub fn generate(&self, name: &str) -> Result<Box<dyn Engine>> {
        let key = name.trim().to_ascii_lowercase();
        if let Some(constructor) = self.custom.get(&key) {
            return Ok(constructor());
        }
        match key.as_str() {
            RulesetEngine::NAME => Ok(Box::new(RulesetEngine)),
            TreeEngine::NAME => Ok(Box::new(TreeEngine)),
            ExpressionEngine::NAME => Ok(Box::new(ExpressionEngine)),
            InvokableEngine::NAME => Ok(Box::new(InvokableEngine)),
            _ => Err(FilterError::UnknownEngine(name.to_string())),
        }
    }
}

impl fmt::Debug for EngineFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineFactory")
            .field("engines", &self.names())
            .finish()
    }
}

/// What to do when the header names an engine that may not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderFallback {
    /// Use the filter's default engine.
    #[default]
    Default,
    /// Fail with [`FilterError::EngineNotAllowed`].
    Error,
}

/// Header-driven engine override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSelector {
    /// Whether the header is consulted at all.
    pub enabled: bool,
    /// Header name (matched case-insensitively).
    pub name: String,
    /// Header values that may be used, checked before `engine_map`. Empty
    /// allows every value.
    pub allowed_engines: Vec<String>,
    /// Header value → engine name.
    pub engine_map: BTreeMap<String, String>,
    /// Behavior for values that do not resolve to an allowed engine.
    pub fallback: HeaderFallback,
}

impl Default for HeaderSelector {
    fn default() -> Self {
        HeaderSelector {
            enabled: false,
            name: "X-Filter-Mode".to_string(),
            allowed_engines: Vec::new(),
            engine_map: BTreeMap::new(),
            fallback: HeaderFallback::Default,
        }
    }
}

impl HeaderSelector {
    /// Creates an enabled selector reading `name`.
    pub fn new(name: &str) -> Self {
        HeaderSelector {
            enabled: true,
            name: name.to_string(),
            ..HeaderSelector::default()
        }
    }

    /// Restricts the header values (engine names or mapped aliases).
    pub fn allow<I, S>(mut self, engines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_engines = engines.into_iter().map(Into::into).collect();
        self
    }

    /// Maps a header value to an engine name.
    pub fn map(mut self, value: &str, engine: &str) -> Self {
        self.engine_map
            .insert(value.to_ascii_lowercase(), engine.to_ascii_lowercase());
        self
    }

    /// Sets the fallback behavior.
    pub fn fallback(mut self, fallback: HeaderFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Translates a header value through the alias map.
    pub fn translate(&self, value: &str) -> String {
        self.engine_map
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(value))
            .map(|(_, to)| to.to_ascii_lowercase())
            .unwrap_or_else(|| value.to_ascii_lowercase())
    }

    /// Picks the engine name for a request.
    ///
    /// A missing or blank header selects `default`. The value must be in the
    /// allow-list (if one is set); it is then translated through the alias
    /// map and must name a known engine.
    pub fn select(&self, headers: &Headers, default: &str, factory: &EngineFactory) -> Result<String> {
        if !self.enabled {
            return Ok(default.to_string());
        }
        let Some(raw) = headers.get(&self.name).map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(default.to_string());
        };

        let value = raw.to_ascii_lowercase();
        let allowed = self.allowed_engines.is_empty()
            || self
                .allowed_engines
                .iter()
                .any(|e| e.eq_ignore_ascii_case(&value));
        let engine = self.translate(&value);

        if allowed && factory.contains(&engine) {
            tracing::debug!(header = %self.name, %engine, "engine selected by header");
            return Ok(engine);
        }

        match self.fallback {
            HeaderFallback::Default => {
                tracing::warn!(
                    header = %self.name,
                    value = raw,
                    default,
                    "header selects a disallowed engine, using default"
                );
                Ok(default.to_string())
            }
            HeaderFallback::Error => Err(FilterError::EngineNotAllowed {
                header: self.name.clone(),
                value: raw.to_string(),
            }),
        }
    }
}
