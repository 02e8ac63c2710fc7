//! Sift - request-driven query filter builder.
//!
//! Sift turns untrusted request input (query strings, JSON bodies) into
//! validated predicates on a query builder. It supports:
//!
//! - Four resolution engines: flat rules, AND/OR trees, operator maps and
//!   handler dispatch
//! - Field allow-lists with aliases, relation allow-lists with dotted paths
//! - Operator registries with per-filter narrowing
//! - Ordered per-field sanitizers
//! - Strict (fail fast) and permissive (drop silently) validation
//! - Header-driven engine override
//! - Sorting with allowed fields, defaults and aliases
//!
//! Sift never talks to storage. Engines write into a [`PredicateSink`],
//! implemented by your query builder or by the in-memory
//! [`MemorySink`](memory::MemorySink).
//!
//! # Quick Start
//!
//! ```rust
//! use sift::{Filter, FilterRequest, FilterSettings, RelationRules};
//! use sift::memory::MemorySink;
//! use serde_json::json;
//!
//! let settings = FilterSettings::builder()
//!     .allow_fields(["status"])
//!     .relations(RelationRules::list(["tags"]))
//!     .build()
//!     .unwrap();
//!
//! let filter = Filter::builder()
//!     .engine("expression")
//!     .settings(settings)
//!     .filter_key(Some("filter"))
//!     .build()
//!     .unwrap();
//!
//! let request = FilterRequest::from_json(json!({
//!     "filter": {"status": {"eq": "active"}, "tags.name": "rust", "secret": 1}
//! }))
//! .unwrap();
//!
//! let mut sink = MemorySink::new();
//! filter.apply(&request, &mut sink).unwrap();
//!
//! let rows = vec![
//!     json!({"status": "active", "tags": [{"name": "rust"}]}),
//!     json!({"status": "active", "tags": [{"name": "go"}]}),
//! ];
//! assert_eq!(sink.count(&rows), 1);
//! ```
//!
//! # Resolution
//!
//! Every entry runs the same pipeline before anything reaches the sink:
//!
//! ```text
//! field    → allow-list / relation rules → column (+ relation chain)
//! operator → registry ∩ allow-list       → native operator
//! value    → empty-value policy          → sanitizers
//! ```
//!
//! | Mode | Disallowed field | Disallowed operator | Malformed input |
//! |------|------------------|---------------------|-----------------|
//! | strict | error | error | error |
//! | permissive | entry dropped | default operator | error |
//!
//! # Engines
//!
//! | Name | Input |
//! |------|-------|
//! | `ruleset` | `{"status": "active", "age": "gte:18"}` |
//! | `tree` | `{"and": [{"field": .., "operator": .., "value": ..}, {"or": [..]}]}` |
//! | `expression` | `{"age": {"gte": 18}, "tags.name": "rust"}` |
//! | `invokable` | declared keys dispatched to [`HandlerTable`] handlers |

mod clause;
pub mod config;
mod context;
mod engine;
mod error;
mod factory;
mod field;
mod filter;
mod input;
pub mod memory;
mod op;
mod payload;
mod relation;
pub mod sanitize;
mod settings;
mod sink;
mod sorting;
mod value;

// Re-export public API
pub use clause::Clause;
pub use config::{EngineOptions, FilterConfig, SortConfig};
pub use context::{FilterEvent, FilterRunContext, Provided, SkipReason};
pub use engine::{
    Engine, ExpressionEngine, FilterRun, HandlerFn, HandlerTable, InvokableEngine, RulesetEngine,
    TreeEngine, TreeNode, RESERVED_HANDLER_NAMES,
};
pub use error::{FilterError, Result};
pub use factory::{EngineFactory, HeaderFallback, HeaderSelector};
pub use field::{AllowedFields, FieldResolver};
pub use filter::{Filter, FilterBuilder, FilterReport};
pub use input::{FilterRequest, Headers};
pub use op::{Op, OperatorRegistry};
pub use payload::{LikeSide, Payload};
pub use relation::{RelationPath, RelationRules};
pub use sanitize::{Sanitizer, SanitizerPipeline};
pub use settings::{EmptyValue, FilterSettings, FilterSettingsBuilder};
pub use sink::{Logical, PredicateSink, Scope};
pub use sorting::{Dir, OrderBy, SortRules};
pub use value::{compare_values, is_empty_value, to_list, Number};
