//! Per-run context: event listeners and caller-provided data.
//!
//! A [`FilterRunContext`] is created by the caller for one filter run and
//! threaded through resolution and application. It replaces process-wide
//! registries: listeners and provided data live exactly as long as the run.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Something that happened during a filter run.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    /// An engine was selected and is about to resolve input.
    Started { engine: String, entries: usize },
    /// A clause (or handler invocation) reached the sink.
    ClauseApplied {
        field: String,
        operator: String,
        relation: Option<String>,
    },
    /// An entry was dropped without touching the sink.
    EntrySkipped { field: String, reason: SkipReason },
    /// Orderings were applied.
    Sorted { orders: usize },
    /// The run finished successfully.
    Finished { engine: String, applied: usize },
}

/// Why an entry was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The field (or relation) is not allowed and the run is permissive.
    NotAllowed,
    /// The value was empty and empty values are ignored.
    EmptyValue,
    /// The column is not part of the configured schema.
    UnknownColumn,
    /// No handler is registered for the filter key.
    NoHandler,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NotAllowed => "not allowed",
            SkipReason::EmptyValue => "empty value",
            SkipReason::UnknownColumn => "unknown column",
            SkipReason::NoHandler => "no handler",
        };
        f.write_str(text)
    }
}

/// Type-keyed container for data the caller provides to a run.
///
/// Invokable handlers read it through
/// [`FilterRunContext::provided`]: the current user, a tenant id, anything a
/// handler needs that is not part of the request input.
///
/// # Example
///
/// ```rust
/// use sift::Provided;
///
/// struct TenantId(u64);
///
/// let mut provided = Provided::new();
/// provided.insert(TenantId(7));
/// assert_eq!(provided.get::<TenantId>().map(|t| t.0), Some(7));
/// ```
#[derive(Default)]
pub struct Provided {
    map: HashMap<TypeId, Box<dyn Any>>,
}

impl Provided {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T: 'static>(&mut self, val: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(val))
            .and_then(|boxed| boxed.downcast().ok().map(|b| *b))
    }

    /// Gets a reference to a value of the given type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Removes a value of the given type.
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast().ok().map(|b| *b))
    }

    /// Returns `true` if a value of the given type is present.
    pub fn contains<T: 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Provided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provided")
            .field("len", &self.map.len())
            .finish_non_exhaustive()
    }
}

type Listener = Box<dyn FnMut(&FilterEvent)>;

/// Context for one filter run.
#[derive(Default)]
pub struct FilterRunContext {
    listeners: Vec<Listener>,
    provided: Provided,
    applied: usize,
}

impl FilterRunContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event listener.
    pub fn on_event<F>(mut self, listener: F) -> Self
    where
        F: FnMut(&FilterEvent) + 'static,
    {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Adds provided data.
    pub fn provide<T: 'static>(mut self, value: T) -> Self {
        self.provided.insert(value);
        self
    }

    /// Returns the provided data.
    pub fn provided(&self) -> &Provided {
        &self.provided
    }

    /// Returns mutable provided data.
    pub fn provided_mut(&mut self) -> &mut Provided {
        &mut self.provided
    }

    /// Returns how many clauses this run has applied so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Delivers an event to every listener.
    pub fn emit(&mut self, event: FilterEvent) {
        if let FilterEvent::ClauseApplied { .. } = event {
            self.applied += 1;
        }
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    pub(crate) fn reset_applied(&mut self) {
        self.applied = 0;
    }

    /// Records a skipped entry.
    pub(crate) fn skipped(&mut self, field: &str, reason: SkipReason) {
        tracing::debug!(field, %reason, "entry skipped");
        self.emit(FilterEvent::EntrySkipped {
            field: field.to_string(),
            reason,
        });
    }
}

impl fmt::Debug for FilterRunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRunContext")
            .field("listeners", &self.listeners.len())
            .field("provided", &self.provided)
            .field("applied", &self.applied)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn provided_round_trip() {
        #[derive(Debug, PartialEq)]
        struct UserId(u32);

        let mut provided = Provided::new();
        assert!(provided.insert(UserId(1)).is_none());
        assert_eq!(provided.insert(UserId(2)), Some(UserId(1)));
        assert!(provided.contains::<UserId>());
        assert_eq!(provided.remove::<UserId>(), Some(UserId(2)));
        assert!(provided.is_empty());
    }

    #[test]
    fn listeners_receive_events_and_count_clauses() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut ctx = FilterRunContext::new().on_event(move |e| sink.borrow_mut().push(e.clone()));

        ctx.emit(FilterEvent::ClauseApplied {
            field: "status".into(),
            operator: "=".into(),
            relation: None,
        });
        ctx.skipped("secret", SkipReason::NotAllowed);

        assert_eq!(ctx.applied(), 1);
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(
            seen.borrow()[1],
            FilterEvent::EntrySkipped {
                field: "secret".into(),
                reason: SkipReason::NotAllowed,
            }
        );
    }
}
