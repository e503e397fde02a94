//! Pending Operations
//!
//! Structural edits never touch the graph directly. Each request is recorded
//! as a `PendingOperation` and only takes effect when the tree commits.
//!
//! The queues are kept per operation kind so that `commit()` can apply them
//! in a fixed order regardless of the order requests were made in.

use super::context::{Context, ContextName};
use super::node::Dependency;
use super::NodeId;

/// A deferred structural edit.
#[derive(Debug, Clone)]
pub enum PendingOperation {
    AddParent { child: NodeId, parent: NodeId },
    RemoveParent { child: NodeId, parent: NodeId },
    AddDependency { effect: NodeId, dependency: Dependency },
    RemoveDependency { effect: NodeId, dependency: Dependency },
    AddContext { target: NodeId, context: Context },
    RemoveContext { target: NodeId, context: ContextName },
}

/// The six operation queues owned by a tree.
#[derive(Debug, Default)]
pub(crate) struct PendingQueues {
    pub(crate) remove_parent: Vec<(NodeId, NodeId)>,
    pub(crate) remove_dependency: Vec<(NodeId, Dependency)>,
    pub(crate) remove_context: Vec<(NodeId, ContextName)>,
    pub(crate) add_parent: Vec<(NodeId, NodeId)>,
    pub(crate) add_dependency: Vec<(NodeId, Dependency)>,
    pub(crate) add_context: Vec<(NodeId, Context)>,
}

impl PendingQueues {
    pub(crate) fn push(&mut self, op: PendingOperation) {
        match op {
            PendingOperation::AddParent { child, parent } => self.add_parent.push((child, parent)),
            PendingOperation::RemoveParent { child, parent } => {
                self.remove_parent.push((child, parent))
            }
            PendingOperation::AddDependency { effect, dependency } => {
                self.add_dependency.push((effect, dependency))
            }
            PendingOperation::RemoveDependency { effect, dependency } => {
                self.remove_dependency.push((effect, dependency))
            }
            PendingOperation::AddContext { target, context } => {
                self.add_context.push((target, context))
            }
            PendingOperation::RemoveContext { target, context } => {
                self.remove_context.push((target, context))
            }
        }
    }

    /// Drop every queued operation that mentions `id`. Returns how many.
    pub(crate) fn purge(&mut self, id: NodeId) -> usize {
        let before = self.len();
        let edge = |(a, b): &(NodeId, NodeId)| *a != id && *b != id;
        let dependency =
            |(effect, dep): &(NodeId, Dependency)| *effect != id && dep.node() != id;

        self.remove_parent.retain(edge);
        self.add_parent.retain(edge);
        self.remove_dependency.retain(dependency);
        self.add_dependency.retain(dependency);
        self.remove_context.retain(|(target, _)| *target != id);
        self.add_context.retain(|(target, _)| *target != id);
        before - self.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.remove_parent.len()
            + self.remove_dependency.len()
            + self.remove_context.len()
            + self.add_parent.len()
            + self.add_dependency.len()
            + self.add_context.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
