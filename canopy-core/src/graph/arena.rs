//! Node arena and the structural algorithms that run under the graph lock.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use super::context::{Context, ContextName, ContextSource};
use super::event::ContextHook;
use super::node::{Dependency, DisposeStatus, NodeId, NodeKind, NodeRecord};
use super::queue::PendingQueues;

/// Everything guarded by the graph lock.
pub(crate) struct GraphState {
    pub(crate) root: NodeId,
    pub(crate) nodes: HashMap<NodeId, NodeRecord>,
    pub(crate) queues: PendingQueues,

    /// Every node the mark pass flagged, in marking order. Entries whose
    /// cascade has been claimed are pruned lazily.
    pub(crate) parked: Vec<NodeId>,

    /// Context hooks to run once the lock is released.
    pub(crate) fired: Vec<(ContextHook, Context)>,
}

impl GraphState {
    pub(crate) fn new(root: NodeId) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(root, NodeRecord::new(root, NodeKind::Root));
        Self {
            root,
            nodes,
            queues: PendingQueues::default(),
            parked: Vec::new(),
            fired: Vec::new(),
        }
    }

    /// Status of a node. Evicted ids read as disposed.
    pub(crate) fn status(&self, id: NodeId) -> DisposeStatus {
        self.nodes
            .get(&id)
            .map(|record| record.status)
            .unwrap_or(DisposeStatus::Disposed)
    }

    pub(crate) fn is_alive(&self, id: NodeId) -> bool {
        self.status(id) == DisposeStatus::Alive
    }

    pub(crate) fn is_disposed(&self, id: NodeId) -> bool {
        self.status(id) == DisposeStatus::Disposed
    }

    // ------------------------------------------------------------------------
    // Contexts
    // ------------------------------------------------------------------------

    /// Queue the context hooks a node registered for `context`.
    fn fire(&mut self, id: NodeId, context: &Context) {
        if let Some(record) = self.nodes.get(&id) {
            for hook in record.hooks.context_hooks(&context.name()) {
                self.fired.push((hook.clone(), context.clone()));
            }
        }
    }

    /// Register a context on the node itself and push it to its descendants.
    pub(crate) fn register_context(&mut self, target: NodeId, context: &Context) {
        let children = match self.nodes.get_mut(&target) {
            Some(record) => {
                record.contexts.insert(context.clone(), ContextSource::Own);
                record.children.clone()
            }
            None => return,
        };
        self.fire(target, context);
        for child in children {
            self.push_context(child, target, context);
        }
    }

    /// Push an inherited context from `from` into `node` and its subtree.
    fn push_context(&mut self, node: NodeId, from: NodeId, context: &Context) {
        let children = match self.nodes.get_mut(&node) {
            Some(record) if record.is_alive() => {
                match record.contexts.get(&context.name()) {
                    Some(entry) if entry.source == ContextSource::Own => return,
                    Some(entry) if entry.context.same_value(context) => return,
                    _ => {}
                }
                record
                    .contexts
                    .insert(context.clone(), ContextSource::Inherited(from));
                record.children.clone()
            }
            _ => return,
        };
        trace!(node = %node, context = %context.name(), "context pushed");
        self.fire(node, context);
        for child in children {
            self.push_context(child, node, context);
        }
    }

    /// Remove the entry `node` inherited from `from`, and everything below that
    /// inherited it from `node`.
    pub(crate) fn strip_context(&mut self, node: NodeId, name: ContextName, from: NodeId) {
        let children = match self.nodes.get_mut(&node) {
            Some(record) if record.contexts.inherited_from(&name, from) => {
                record.contexts.remove(&name);
                record.contexts_resolved = false;
                record.children.clone()
            }
            _ => return,
        };
        trace!(node = %node, context = %name, "context stripped");
        for child in children {
            self.strip_context(child, name, node);
        }
    }

    /// Mark a node and every descendant as needing to pull inherited contexts.
    pub(crate) fn mark_unresolved(&mut self, id: NodeId) {
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            if let Some(record) = self.nodes.get_mut(&next) {
                record.contexts_resolved = false;
                stack.extend(record.children.iter().copied());
            }
        }
    }

    /// Pull contexts from the parents into a node that was attached (or lost
    /// entries) since its last lookup. Parents resolve first.
    pub(crate) fn ensure_resolved(&mut self, id: NodeId) {
        let parents = match self.nodes.get_mut(&id) {
            Some(record) if !record.contexts_resolved => {
                record.contexts_resolved = true;
                record.parents.clone()
            }
            _ => return,
        };

        for parent in parents {
            self.ensure_resolved(parent);
            let inherited = match self.nodes.get(&parent) {
                Some(record) => record.contexts.contexts(),
                None => continue,
            };
            for context in inherited {
                let Some(record) = self.nodes.get_mut(&id) else {
                    return;
                };
                if record.contexts.contains(&context.name()) {
                    continue;
                }
                record
                    .contexts
                    .insert(context.clone(), ContextSource::Inherited(parent));
                self.fire(id, &context);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Ownership edges
    // ------------------------------------------------------------------------

    /// Cut the `parent -> child` edge, stripping the contexts it contributed.
    pub(crate) fn detach(&mut self, child: NodeId, parent: NodeId) {
        if let Some(record) = self.nodes.get_mut(&parent) {
            record.children.retain(|c| *c != child);
        }

        let inherited = match self.nodes.get(&child) {
            Some(record) => record.contexts.names_inherited_from(parent),
            None => return,
        };
        for name in inherited {
            self.strip_context(child, name, parent);
        }

        if let Some(record) = self.nodes.get_mut(&child) {
            record.parents.retain(|p| *p != parent);
        }
    }

    /// Whether every parent of an alive node is gone or going.
    fn is_orphaned(&self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(record) if record.is_alive() && record.kind == NodeKind::Effect => {
                record.parents.iter().all(|p| !self.is_alive(*p))
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------------
    // Disposal
    // ------------------------------------------------------------------------

    /// Synchronous mark pass: flip `id` and the part of its subtree that will
    /// not survive to `Disposing`. Returns false if `id` was not alive.
    pub(crate) fn mark_disposing(&mut self, id: NodeId) -> bool {
        let (children, dependents) = match self.nodes.get_mut(&id) {
            Some(record) if record.is_alive() => {
                record.status = DisposeStatus::Disposing;
                (record.children.clone(), record.all_dependents())
            }
            _ => return false,
        };
        // Parked before the subtree, so a settle pass reaches the parent first.
        self.parked.push(id);
        debug!(node = %id, "disposing");

        for child in children {
            if self.is_orphaned(child) {
                self.mark_disposing(child);
            }
        }
        for dependent in dependents {
            self.mark_disposing(dependent);
        }
        true
    }

    /// Drop parked entries whose cascade is already running or finished.
    pub(crate) fn prune_parked(&mut self) {
        let nodes = &self.nodes;
        self.parked
            .retain(|id| nodes.get(id).is_some_and(|record| !record.cascade_started));
    }

    /// Whether `id` is an alive effect without any parent.
    pub(crate) fn is_unowned(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|record| {
            record.is_alive() && record.kind == NodeKind::Effect && record.parents.is_empty()
        })
    }

    /// Release `child` from a disposing parent. Returns the child if it has to
    /// be cascaded as well.
    pub(crate) fn release_child(&mut self, parent: NodeId, child: NodeId) -> Option<NodeId> {
        self.detach(child, parent);
        match self.status(child) {
            DisposeStatus::Disposing => Some(child),
            DisposeStatus::Alive => {
                let orphaned = self
                    .nodes
                    .get(&child)
                    .is_some_and(|record| record.parents.is_empty());
                (orphaned && self.mark_disposing(child)).then_some(child)
            }
            DisposeStatus::Disposed => None,
        }
    }

    /// Make sure a dependent of a disposing node is disposing too.
    pub(crate) fn doom(&mut self, id: NodeId) -> bool {
        match self.status(id) {
            DisposeStatus::Alive => self.mark_disposing(id),
            DisposeStatus::Disposing => true,
            DisposeStatus::Disposed => false,
        }
    }

    /// Evict a node whose cascade has settled and unlink it from its neighbours.
    pub(crate) fn finalize(&mut self, id: NodeId) {
        let Some(record) = self.nodes.remove(&id) else {
            return;
        };

        for parent in &record.parents {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
        for child in &record.children {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parents.retain(|p| *p != id);
            }
        }
        for dependency in &record.dependencies {
            self.unlink_dependent(id, dependency);
        }
        for dependent in record.all_dependents() {
            if let Some(d) = self.nodes.get_mut(&dependent) {
                d.dependencies.retain(|dep| dep.node() != id);
            }
        }
    }

    /// Remove `effect` from the dependent list the dependency registered it in.
    pub(crate) fn unlink_dependent(&mut self, effect: NodeId, dependency: &Dependency) {
        let Some(node) = self.nodes.get_mut(&dependency.node()) else {
            return;
        };
        match dependency {
            Dependency::Node(_) => node.dependents.retain(|d| *d != effect),
            Dependency::Context(_, name) => {
                if let Some(bucket) = node.context_dependents.get_mut(name) {
                    bucket.retain(|d| *d != effect);
                    if bucket.is_empty() {
                        node.context_dependents.shift_remove(name);
                    }
                }
            }
        }
    }
}
