//! The filter: engine selection, resolution and sorting for one request.
//!
//! A [`Filter`] is built once and applied to any number of requests. Each
//! [`apply`](Filter::apply) picks an engine (the default, or the one named by
//! the override header), extracts the filter input from the request, runs
//! the engine against the engine's settings and finally applies sorting.

use std::collections::BTreeMap;

use crate::config::FilterConfig;
use crate::context::{FilterEvent, FilterRunContext};
use crate::engine::{Engine, FilterRun, HandlerTable};
use crate::error::{FilterError, Result};
use crate::factory::{EngineFactory, HeaderSelector};
use crate::input::FilterRequest;
use crate::settings::FilterSettings;
use crate::sink::PredicateSink;
use crate::sorting::{OrderBy, SortRules};

/// Summary of one filter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterReport {
    /// Engine that resolved the input.
    pub engine: String,
    /// Clauses (or handler invocations) that reached the sink.
    pub applied: usize,
    /// Orderings that reached the sink.
    pub orders: Vec<OrderBy>,
}

/// A reusable filter definition.
///
/// # Example
///
/// ```
/// use sift::{Filter, FilterRequest, FilterSettings};
/// use sift::memory::MemorySink;
/// use serde_json::json;
///
/// let filter = Filter::builder()
///     .settings(FilterSettings::builder().allow_fields(["status"]).build().unwrap())
///     .build()
///     .unwrap();
///
/// let request = FilterRequest::from_json(json!({"status": "pending", "secret": 1})).unwrap();
/// let mut sink = MemorySink::new();
/// let report = filter.apply(&request, &mut sink).unwrap();
///
/// assert_eq!(report.engine, "ruleset");
/// assert_eq!(report.applied, 1);
/// ```
#[derive(Debug, Clone)]
pub struct Filter {
    factory: EngineFactory,
    default_engine: String,
    header: HeaderSelector,
    settings: FilterSettings,
    engine_settings: BTreeMap<String, FilterSettings>,
    handlers: HandlerTable,
    sorting: Option<SortRules>,
    filter_key: Option<String>,
    sort_key: String,
}

impl Filter {
    /// Starts a filter builder.
    pub fn builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    /// Starts a builder from a configuration.
    ///
    /// Engines listed in the configuration get their own settings; every
    /// other engine uses the `defaults` options.
    pub fn from_config(config: &FilterConfig) -> Result<FilterBuilder> {
        let mut builder = FilterBuilder::default()
            .engine(&config.default_engine)
            .header(config.header.clone())
            .settings(config.default_settings()?)
            .filter_key(config.filter_key.as_deref())
            .sort_key(&config.sort_key);
        for name in config.engines.keys() {
            builder = builder.engine_settings(name, config.settings_for(name)?);
        }
        if let Some(rules) = config.sort_rules()? {
            builder = builder.sorting(rules);
        }
        Ok(builder)
    }

    /// The default engine name.
    pub fn default_engine(&self) -> &str {
        &self.default_engine
    }

    /// Settings used when `engine` runs.
    pub fn settings_for(&self, engine: &str) -> &FilterSettings {
        self.engine_settings
            .get(&engine.to_ascii_lowercase())
            .unwrap_or(&self.settings)
    }

    /// Picks the engine for a request.
    pub fn select_engine(&self, request: &FilterRequest) -> Result<String> {
        self.header
            .select(request.headers(), &self.default_engine, &self.factory)
    }

    /// Applies the filter with a fresh run context.
    pub fn apply(&self, request: &FilterRequest, sink: &mut dyn PredicateSink) -> Result<FilterReport> {
        let mut context = FilterRunContext::new();
        self.apply_in(request, sink, &mut context)
    }

    /// Applies the filter within a caller-provided run context.
    ///
    /// Engine selection and input extraction happen before anything touches
    /// the sink. Once the engine runs, an error leaves the clauses applied
    /// so far in the sink.
    pub fn apply_in(
        &self,
        request: &FilterRequest,
        sink: &mut dyn PredicateSink,
        context: &mut FilterRunContext,
    ) -> Result<FilterReport> {
        let name = self.select_engine(request)?;
        let engine = self.factory.generate(&name)?;
        let input = request.filter_input(self.filter_key.as_deref(), &[self.sort_key.as_str()])?;
        let settings = self.settings_for(&name);

        tracing::debug!(engine = %name, entries = input.len(), "filter run started");
        context.reset_applied();
        context.emit(FilterEvent::Started {
            engine: name.clone(),
            entries: input.len(),
        });

        let mut run = FilterRun {
            input: &input,
            settings,
            handlers: &self.handlers,
            context: &mut *context,
        };
        engine.apply(&mut run, sink)?;

        let orders = match &self.sorting {
            Some(rules) => rules.apply(request.param(&self.sort_key), sink)?,
            None => Vec::new(),
        };
        if !orders.is_empty() {
            context.emit(FilterEvent::Sorted {
                orders: orders.len(),
            });
        }

        let applied = context.applied();
        context.emit(FilterEvent::Finished {
            engine: name.clone(),
            applied,
        });
        tracing::debug!(engine = %name, applied, orders = orders.len(), "filter run finished");

        Ok(FilterReport {
            engine: name,
            applied,
            orders,
        })
    }
}

/// Builder for [`Filter`].
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    factory: EngineFactory,
    default_engine: String,
    header: HeaderSelector,
    settings: FilterSettings,
    engine_settings: BTreeMap<String, FilterSettings>,
    handlers: HandlerTable,
    sorting: Option<SortRules>,
    filter_key: Option<String>,
    sort_key: String,
}

impl Default for FilterBuilder {
    fn default() -> Self {
        FilterBuilder {
            factory: EngineFactory::new(),
            default_engine: crate::engine::RulesetEngine::NAME.to_string(),
            header: HeaderSelector::default(),
            settings: FilterSettings::default(),
            engine_settings: BTreeMap::new(),
            handlers: HandlerTable::new(),
            sorting: None,
            filter_key: None,
            sort_key: "sort".to_string(),
        }
    }
}

impl FilterBuilder {
    /// Sets the default engine.
    pub fn engine(mut self, name: &str) -> Self {
        self.default_engine = name.trim().to_ascii_lowercase();
        self
    }

    /// Registers a custom engine.
    pub fn extend<F>(mut self, name: &str, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Engine> + Send + Sync + 'static,
    {
        self.factory = self.factory.extend(name, constructor);
        self
    }

    /// Sets the header override.
    pub fn header(mut self, header: HeaderSelector) -> Self {
        self.header = header;
        self
    }

    /// Sets the settings used by every engine without its own.
    pub fn settings(mut self, settings: FilterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the settings for one engine.
    pub fn engine_settings(mut self, engine: &str, settings: FilterSettings) -> Self {
        self.engine_settings
            .insert(engine.to_ascii_lowercase(), settings);
        self
    }

    /// Sets the invokable engine's handlers.
    pub fn handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = handlers;
        self
    }

    /// Enables sorting.
    pub fn sorting(mut self, rules: SortRules) -> Self {
        self.sorting = Some(rules);
        self
    }

    /// Sets the parameter holding the filter input (`None` for flat input).
    pub fn filter_key(mut self, key: Option<&str>) -> Self {
        self.filter_key = key.map(String::from);
        self
    }

    /// Sets the parameter holding the sort value.
    pub fn sort_key(mut self, key: &str) -> Self {
        self.sort_key = key.to_string();
        self
    }

    /// Validates and builds the filter.
    ///
    /// Fails when the default engine is unknown, when a header value the
    /// allow-list or alias map admits translates to an unknown engine, or
    /// when a handler takes a reserved name.
    pub fn build(self) -> Result<Filter> {
        if !self.factory.contains(&self.default_engine) {
            return Err(FilterError::UnknownEngine(self.default_engine));
        }
        let header = &self.header;
        if let Some(unknown) = header
            .allowed_engines
            .iter()
            .map(|value| header.translate(value))
            .chain(header.engine_map.values().cloned())
            .find(|name| !self.factory.contains(name))
        {
            return Err(FilterError::UnknownEngine(unknown));
        }
        self.handlers.validate()?;

        Ok(Filter {
            factory: self.factory,
            default_engine: self.default_engine,
            header: self.header,
            settings: self.settings,
            engine_settings: self.engine_settings,
            handlers: self.handlers,
            sorting: self.sorting,
            filter_key: self.filter_key,
            sort_key: self.sort_key,
        })
    }
}
