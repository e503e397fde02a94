//! Effect Graph
//!
//! This module implements the engine behind effect trees: node storage,
//! deferred structural edits, context propagation, disposal cascades and
//! event traversal.
//!
//! # Overview
//!
//! Nodes live in an arena keyed by `NodeId`. Edges are stored as id lists on
//! both ends:
//!
//! - `children` / `parents`: reference-counted ownership. An effect is
//!   disposed when its last parent is removed.
//! - `dependents` / `dependencies`: non-ownership edges. Disposing a node
//!   disposes everything that depends on it.
//!
//! # Design Decisions
//!
//! 1. Structural edits are queued and applied by `commit()` in a fixed order
//!    (all removals, then parent and dependency additions, then contexts), so
//!    traversals never observe a half-edited graph.
//!
//! 2. Disposal has two phases: a synchronous mark pass that flips the whole
//!    doomed subtree to `Disposing`, then an async cascade that runs teardown
//!    hooks with children and dependents fanned out and joined.
//!
//! 3. A disposed node's record is evicted from the arena. Ids are never
//!    reused, so any later reference to it reads as disposed.
//!
//! 4. The arena lock is never held while host code runs. Hooks and teardowns
//!    are collected under the lock and invoked after it is released.

mod arena;
mod commit;
mod context;
mod dispose;
mod event;
mod node;
mod queue;
mod traverse;

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

pub use commit::CommitSummary;
pub use context::{Context, ContextName};
pub use dispose::{Disposal, Teardown};
pub use event::{ContextHook, Event, EventHook, HookTable, Traversal};
pub use node::{Dependency, DisposeStatus, NodeId, NodeKind};
pub use queue::PendingOperation;

pub(crate) use arena::GraphState;
pub(crate) use node::NodeRecord;

use crate::error::{ContextMissingError, GraphError};

/// Shared state of one effect tree.
pub(crate) struct Graph {
    state: Mutex<GraphState>,
}

impl Graph {
    /// Create a graph together with its root node.
    pub(crate) fn new() -> (Arc<Self>, NodeId) {
        let root = NodeId::next();
        let graph = Arc::new(Self {
            state: Mutex::new(GraphState::new(root)),
        });
        (graph, root)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock()
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.lock().nodes.contains_key(&id)
    }

    pub(crate) fn insert(&self, record: NodeRecord) {
        self.lock().nodes.insert(record.id, record);
    }

    /// Drop a node that never made it past construction, together with any
    /// structural edits queued for it.
    pub(crate) fn discard(&self, id: NodeId) {
        let mut state = self.lock();
        state.nodes.remove(&id);
        let purged = state.queues.purge(id);
        tracing::trace!(node = %id, purged, "node discarded");
    }

    pub(crate) fn enqueue(&self, op: PendingOperation) {
        tracing::trace!(?op, "queued");
        self.lock().queues.push(op);
    }

    pub(crate) fn pending_operations(&self) -> usize {
        self.lock().queues.len()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub(crate) fn status(&self, id: NodeId) -> DisposeStatus {
        self.lock().status(id)
    }

    /// Apply every queued operation, then run the context hooks it triggered.
    pub(crate) fn commit(&self) -> CommitSummary {
        let summary = self.lock().commit();
        self.run_context_hooks();
        summary
    }

    pub(crate) fn has_context(&self, id: NodeId, name: ContextName) -> bool {
        let found = {
            let mut state = self.lock();
            state.ensure_resolved(id);
            state
                .nodes
                .get(&id)
                .is_some_and(|record| record.contexts.contains(&name))
        };
        self.run_context_hooks();
        found
    }

    pub(crate) fn context(
        &self,
        id: NodeId,
        name: ContextName,
    ) -> Result<Context, ContextMissingError> {
        let found = {
            let mut state = self.lock();
            state.ensure_resolved(id);
            state
                .nodes
                .get(&id)
                .and_then(|record| record.contexts.get(&name))
                .map(|entry| entry.context.clone())
        };
        self.run_context_hooks();
        found.ok_or(ContextMissingError {
            node: id,
            context: name,
        })
    }

    pub(crate) fn contexts(&self, id: NodeId) -> Vec<Context> {
        let found = {
            let mut state = self.lock();
            state.ensure_resolved(id);
            state
                .nodes
                .get(&id)
                .map(|record| record.contexts.contexts())
                .unwrap_or_default()
        };
        self.run_context_hooks();
        found
    }

    /// Read a structural list of a node that has not been disposed.
    pub(crate) fn query<T>(
        &self,
        id: NodeId,
        read: impl FnOnce(&NodeRecord) -> T,
    ) -> Result<T, GraphError> {
        let state = self.lock();
        match state.nodes.get(&id) {
            Some(record) if record.status != DisposeStatus::Disposed => Ok(read(record)),
            _ => Err(GraphError::NodeDisposed { node: id }),
        }
    }

    pub(crate) fn set_hooks(&self, id: NodeId, hooks: HookTable) {
        if let Some(record) = self.lock().nodes.get_mut(&id) {
            record.hooks.merge(hooks);
        }
    }

    fn run_context_hooks(&self) {
        let fired = std::mem::take(&mut self.lock().fired);
        for (hook, context) in fired {
            hook(&context);
        }
    }
}
