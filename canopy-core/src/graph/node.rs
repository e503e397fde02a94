//! Graph Nodes
//!
//! This module defines the per-node record stored in the effect arena.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::{ContextMap, ContextName};
use super::dispose::Teardown;
use super::event::HookTable;

/// Unique identifier for a node in the effect graph.
///
/// Ids come from a process-wide counter and are never reused, so an id whose
/// record has been evicted from the arena is recognisably stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate the next node id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Disposal state of a node.
///
/// Transitions are monotonic: `Alive -> Disposing -> Disposed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DisposeStatus {
    Alive,

    /// Disposal has started. The node is committed to finishing its cascade.
    Disposing,

    /// The cascade has settled. The node is inert.
    Disposed,
}

/// Whether a node is the root of its tree or an ordinary effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The tree root. Has no parents.
    Root,
    Effect,
}

/// A non-ownership dependency declared by an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Dispose the effect when this node is disposed.
    Node(NodeId),

    /// Dispose the effect when this node is disposed or drops the context.
    Context(NodeId, ContextName),
}

impl Dependency {
    /// The node the dependency points at.
    pub fn node(&self) -> NodeId {
        match *self {
            Dependency::Node(node) | Dependency::Context(node, _) => node,
        }
    }
}

/// A node record in the arena.
pub(crate) struct NodeRecord {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) status: DisposeStatus,

    /// Set once the async part of disposal has been claimed by a caller.
    pub(crate) cascade_started: bool,

    /// Nodes this node owns, in attachment order.
    pub(crate) children: Vec<NodeId>,

    pub(crate) contexts: ContextMap,

    /// Effects that depend on this node directly.
    pub(crate) dependents: Vec<NodeId>,

    /// Effects that depend on a context registered on this node.
    pub(crate) context_dependents: IndexMap<ContextName, Vec<NodeId>>,

    /// Owning parents. An alive effect always has at least one after commit.
    pub(crate) parents: SmallVec<[NodeId; 2]>,

    pub(crate) dependencies: Vec<Dependency>,

    /// False until inherited contexts have been pulled from the parents.
    pub(crate) contexts_resolved: bool,

    pub(crate) hooks: HookTable,
    pub(crate) teardown: Option<Teardown>,
}

impl NodeRecord {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            status: DisposeStatus::Alive,
            cascade_started: false,
            children: Vec::new(),
            contexts: ContextMap::default(),
            dependents: Vec::new(),
            context_dependents: IndexMap::new(),
            parents: SmallVec::new(),
            dependencies: Vec::new(),
            contexts_resolved: true,
            hooks: HookTable::default(),
            teardown: None,
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.status == DisposeStatus::Alive
    }

    /// Direct and per-context dependents, without duplicates.
    pub(crate) fn all_dependents(&self) -> Vec<NodeId> {
        let mut all = self.dependents.clone();
        for bucket in self.context_dependents.values() {
            for &id in bucket {
                if !all.contains(&id) {
                    all.push(id);
                }
            }
        }
        all
    }
}

impl fmt::Debug for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("children", &self.children)
            .field("parents", &self.parents)
            .field("dependents", &self.dependents)
            .field("dependencies", &self.dependencies)
            .field("contexts", &self.contexts.len())
            .finish()
    }
}
