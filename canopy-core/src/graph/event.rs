//! Events and Hooks
//!
//! Events travel root-to-leaves through the ownership tree. Each node may
//! register a hook per event name; the hook is called with the event before
//! the node's children are visited.
//!
//! Children receive a shallow copy of the event. When the subtree visit is
//! done, fields listed as global are copied back into the caller's event, as
//! is the captured flag. Capturing never stops the traversal; consumers check
//! it after `emit` returns.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::context::{Context, ContextName};

/// Callback invoked when an event reaches a node.
pub type EventHook = Arc<dyn Fn(&mut Event) + Send + Sync>;

/// Callback invoked when a context becomes visible on a node.
pub type ContextHook = Arc<dyn Fn(&Context) + Send + Sync>;

/// An event dispatched through the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    fields: Map<String, Value>,
    captured: bool,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an event from a JSON object. Non-object values yield an empty event.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self {
                fields,
                captured: false,
            },
            _ => Self::default(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Mark the event as captured. Purely advisory.
    pub fn capture(&mut self) {
        self.captured = true;
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// Copy the listed fields and the captured flag from a subtree's copy.
    pub(crate) fn absorb(&mut self, local: &Event, global_fields: &[&str]) {
        for &field in global_fields {
            if let Some(value) = local.fields.get(field) {
                self.fields.insert(field.to_owned(), value.clone());
            }
        }
        if local.captured {
            self.captured = true;
        }
    }
}

/// Order in which children are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Array order, earliest attached child first.
    Forward,

    /// Reverse array order, latest attached child first.
    Reversed,
}

/// Per-node table of event and context hooks.
#[derive(Clone, Default)]
pub struct HookTable {
    events: IndexMap<String, EventHook>,
    contexts: IndexMap<ContextName, Vec<ContextHook>>,
}

impl HookTable {
    /// Register the hook for `event`, replacing any previous one.
    pub fn on<F>(&mut self, event: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&mut Event) + Send + Sync + 'static,
    {
        self.events.insert(event.into(), Arc::new(hook));
        self
    }

    /// Register a hook called whenever a context of type `T` becomes visible.
    pub fn on_context<T, F>(&mut self, hook: F) -> &mut Self
    where
        T: std::any::Any,
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.contexts
            .entry(ContextName::of::<T>())
            .or_default()
            .push(Arc::new(hook));
        self
    }

    pub(crate) fn event(&self, event: &str) -> Option<EventHook> {
        self.events.get(event).cloned()
    }

    pub(crate) fn context_hooks(&self, name: &ContextName) -> &[ContextHook] {
        self.contexts.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn merge(&mut self, other: HookTable) {
        self.events.extend(other.events);
        for (name, hooks) in other.contexts {
            self.contexts.entry(name).or_default().extend(hooks);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.contexts.is_empty()
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookTable")
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("contexts", &self.contexts.keys().collect::<Vec<_>>())
            .finish()
    }
}
