//! Contexts
//!
//! A context is a value attached to a node and inherited by its descendants.
//! Its name is derived from the value's type, so there is at most one entry
//! per type on any node.
//!
//! # Propagation
//!
//! Registering a context on a node pushes it eagerly to every live descendant.
//! The push stops at a descendant that registered its own value for the same
//! type. Removing a context strips every entry that was inherited from the
//! removing node, recursively.
//!
//! Attaching a new parent does not copy anything; the child is marked
//! unresolved and pulls missing entries from its parents the next time one of
//! its contexts is looked up.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::NodeId;

/// Name of a context, derived from the type of its value.
#[derive(Clone, Copy)]
pub struct ContextName {
    type_id: TypeId,
    type_name: &'static str,
}

impl ContextName {
    /// The context name for values of type `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Full type name of the context value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ContextName {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ContextName {}

impl std::hash::Hash for ContextName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ContextName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextName({})", self.type_name)
    }
}

impl fmt::Display for ContextName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Strip the module path: `a::b::Theme<c::D>` -> `Theme<c::D>`.
        let generic_start = self.type_name.find('<').unwrap_or(self.type_name.len());
        let (path, generics) = self.type_name.split_at(generic_start);
        let short = path.rsplit("::").next().unwrap_or(path);
        write!(f, "{short}{generics}")
    }
}

/// A named context value.
#[derive(Clone)]
pub struct Context {
    name: ContextName,
    value: Arc<dyn Any + Send + Sync>,
}

impl Context {
    /// Wrap a value as a context.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared value as a context.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            name: ContextName::of::<T>(),
            value,
        }
    }

    pub fn name(&self) -> ContextName {
        self.name
    }

    /// Get the value as `T`, if that is its type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Whether two contexts share the same value allocation.
    pub fn same_value(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("name", &self.name).finish()
    }
}

/// Where a node's context entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextSource {
    /// Registered on the node itself.
    Own,

    /// Pushed from or pulled through the given parent.
    Inherited(NodeId),
}

#[derive(Debug, Clone)]
pub(crate) struct ContextEntry {
    pub(crate) context: Context,
    pub(crate) source: ContextSource,
}

/// Per-node context storage.
#[derive(Debug, Default)]
pub(crate) struct ContextMap {
    entries: IndexMap<ContextName, ContextEntry>,
}

impl ContextMap {
    pub(crate) fn get(&self, name: &ContextName) -> Option<&ContextEntry> {
        self.entries.get(name)
    }

    pub(crate) fn contains(&self, name: &ContextName) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn insert(&mut self, context: Context, source: ContextSource) {
        self.entries
            .insert(context.name(), ContextEntry { context, source });
    }

    pub(crate) fn remove(&mut self, name: &ContextName) -> Option<ContextEntry> {
        self.entries.shift_remove(name)
    }

    /// Whether the entry for `name` was inherited from `parent`.
    pub(crate) fn inherited_from(&self, name: &ContextName, parent: NodeId) -> bool {
        matches!(
            self.entries.get(name),
            Some(entry) if entry.source == ContextSource::Inherited(parent)
        )
    }

    /// Names of the entries inherited from `parent`.
    pub(crate) fn names_inherited_from(&self, parent: NodeId) -> Vec<ContextName> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.source == ContextSource::Inherited(parent))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Snapshot of every visible context.
    pub(crate) fn contexts(&self) -> Vec<Context> {
        self.entries.values().map(|e| e.context.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
