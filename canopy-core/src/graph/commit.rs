//! Commit
//!
//! `commit()` drains the six pending queues in this order, every time:
//!
//! 1. `RemoveParent`
//! 2. `RemoveDependency`
//! 3. `RemoveContext`
//! 4. `AddParent`
//! 5. `AddDependency`
//! 6. `AddContext`
//!
//! Removals land before any addition, so one batch never leaves a node
//! transiently over- or under-parented. Contexts go last so that freshly
//! attached children are wired before values are pushed into them.
//!
//! Operations that reference a node disposed in the meantime are skipped. An
//! effect left without any parent because its attachment was skipped is
//! disposed, like one that lost its last parent.
//!
//! Disposals triggered here only run their mark pass; the cascades are parked
//! on the tree until it settles.

use std::mem;

use tracing::{debug, trace, warn};

use super::arena::GraphState;
use super::context::{Context, ContextName};
use super::node::{Dependency, NodeKind};
use super::NodeId;

/// What a single `commit()` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Operations drained from the queues, skipped ones included.
    pub applied: usize,

    /// Operations skipped because a node they referenced was no longer usable.
    pub skipped: usize,

    /// Nodes that entered `Disposing` during this commit.
    pub disposals: usize,
}

impl GraphState {
    pub(crate) fn commit(&mut self) -> CommitSummary {
        let queues = mem::take(&mut self.queues);
        self.prune_parked();
        let parked_before = self.parked.len();
        let mut summary = CommitSummary {
            applied: queues.len(),
            ..CommitSummary::default()
        };

        let mut tally = |applied: bool| {
            if !applied {
                summary.skipped += 1;
            }
        };

        for (child, parent) in queues.remove_parent {
            tally(self.remove_parent(child, parent));
        }
        for (effect, dependency) in queues.remove_dependency {
            tally(self.remove_dependency(effect, dependency));
        }
        for (target, name) in queues.remove_context {
            tally(self.remove_context(target, name));
        }
        let mut unattached = Vec::new();
        for (child, parent) in queues.add_parent {
            let applied = self.add_parent(child, parent);
            if !applied {
                unattached.push(child);
            }
            tally(applied);
        }
        // Checked after the whole queue: another parent may still have landed.
        for child in unattached {
            if self.is_unowned(child) {
                debug!(node = %child, "attachment skipped, effect has no parent");
                self.mark_disposing(child);
            }
        }
        for (effect, dependency) in queues.add_dependency {
            tally(self.add_dependency(effect, dependency));
        }
        for (target, context) in queues.add_context {
            tally(self.add_context(target, context));
        }

        summary.disposals = self.parked.len() - parked_before;
        if summary.applied > 0 {
            debug!(
                applied = summary.applied,
                skipped = summary.skipped,
                disposals = summary.disposals,
                "commit"
            );
        }
        summary
    }

    fn remove_parent(&mut self, child: NodeId, parent: NodeId) -> bool {
        if self.is_disposed(child) || self.is_disposed(parent) {
            trace!(child = %child, parent = %parent, "skip remove-parent");
            return false;
        }

        self.detach(child, parent);

        let orphaned = self
            .nodes
            .get(&child)
            .is_some_and(|record| record.kind == NodeKind::Effect && record.parents.is_empty());
        if orphaned {
            self.mark_disposing(child);
        }
        true
    }

    fn remove_dependency(&mut self, effect: NodeId, dependency: Dependency) -> bool {
        let Some(record) = self.nodes.get_mut(&effect) else {
            trace!(effect = %effect, "skip remove-dependency");
            return false;
        };
        record.dependencies.retain(|dep| *dep != dependency);
        self.unlink_dependent(effect, &dependency);
        true
    }

    fn remove_context(&mut self, target: NodeId, name: ContextName) -> bool {
        let (children, bucket) = match self.nodes.get_mut(&target) {
            Some(record) => {
                if record.contexts.remove(&name).is_none() {
                    trace!(node = %target, context = %name, "no context to remove");
                    return true;
                }
                // The node may inherit the same type from a parent.
                record.contexts_resolved = false;
                let bucket = record
                    .context_dependents
                    .shift_remove(&name)
                    .unwrap_or_default();
                (record.children.clone(), bucket)
            }
            None => {
                trace!(node = %target, context = %name, "skip remove-context");
                return false;
            }
        };

        for child in children {
            self.strip_context(child, name, target);
        }

        let dependency = Dependency::Context(target, name);
        for effect in bucket {
            if let Some(record) = self.nodes.get_mut(&effect) {
                record.dependencies.retain(|dep| *dep != dependency);
            }
            self.mark_disposing(effect);
        }
        true
    }

    fn add_parent(&mut self, child: NodeId, parent: NodeId) -> bool {
        if child == parent || !self.is_alive(child) || !self.is_alive(parent) {
            trace!(child = %child, parent = %parent, "skip add-parent");
            return false;
        }

        let already_attached = self
            .nodes
            .get(&child)
            .is_some_and(|record| record.parents.contains(&parent));
        if already_attached {
            return true;
        }

        let carries_contexts = match self.nodes.get_mut(&parent) {
            Some(record) => {
                record.children.push(child);
                !record.contexts.is_empty() || !record.contexts_resolved
            }
            None => return false,
        };
        if let Some(record) = self.nodes.get_mut(&child) {
            record.parents.push(parent);
        }
        // Other parents may still be queued for this child, so pull lazily.
        if carries_contexts {
            self.mark_unresolved(child);
        }
        true
    }

    fn add_dependency(&mut self, effect: NodeId, dependency: Dependency) -> bool {
        let node = dependency.node();
        if !self.is_alive(effect) || !self.is_alive(node) {
            trace!(effect = %effect, node = %node, "skip add-dependency");
            return false;
        }

        let duplicate = self
            .nodes
            .get(&effect)
            .is_some_and(|record| record.dependencies.contains(&dependency));
        if duplicate {
            return true;
        }

        match dependency {
            Dependency::Node(node) => {
                if let Some(record) = self.nodes.get_mut(&node) {
                    record.dependents.push(effect);
                }
            }
            Dependency::Context(node, name) => {
                self.ensure_resolved(node);
                let Some(record) = self.nodes.get_mut(&node) else {
                    return false;
                };
                if !record.contexts.contains(&name) {
                    warn!(effect = %effect, node = %node, context = %name, "dependency on missing context");
                    return false;
                }
                record.context_dependents.entry(name).or_default().push(effect);
            }
        }

        if let Some(record) = self.nodes.get_mut(&effect) {
            record.dependencies.push(dependency);
        }
        true
    }

    fn add_context(&mut self, target: NodeId, context: Context) -> bool {
        if !self.is_alive(target) {
            trace!(node = %target, context = %context.name(), "skip add-context");
            return false;
        }
        self.register_context(target, &context);
        true
    }
}
