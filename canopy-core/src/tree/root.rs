//! Effect Tree
//!
//! The root of one effect graph. It is the only node without a parent, owns
//! the pending-operation queues and is the only place `commit()` can be
//! called from.

use std::future::Future;

use crate::error::CascadeFailure;
use crate::graph::{CommitSummary, Graph, NodeId};

use super::node::{EffectNode, NodeHandle};

/// Root authority of one effect graph.
///
/// # Example
///
/// ```rust,ignore
/// let tree = EffectTree::new();
/// let parent = Effect::new(&tree)?;
/// let child = Effect::new(&parent)?;
/// tree.commit();
///
/// parent.dispose().await?;
/// assert!(child.is_disposed());
/// ```
#[derive(Clone, Debug)]
pub struct EffectTree {
    handle: NodeHandle,
}

impl EffectTree {
    pub fn new() -> Self {
        let (graph, id) = Graph::new();
        tracing::debug!(root = %id, "effect tree created");
        Self {
            handle: NodeHandle { graph, id },
        }
    }

    /// Apply every queued structural edit.
    ///
    /// Disposals triggered here are marked immediately; their teardowns run
    /// when the tree is [settled](Self::settle).
    pub fn commit(&self) -> CommitSummary {
        self.handle.graph.commit()
    }

    /// Run the disposal cascades parked by earlier commits to completion.
    pub fn settle(&self) -> impl Future<Output = Result<(), CascadeFailure>> + Send + 'static {
        self.handle.graph.settle()
    }

    /// Number of structural edits waiting for the next commit.
    pub fn pending_operations(&self) -> usize {
        self.handle.graph.pending_operations()
    }

    /// Number of nodes in the arena, root included. Disposed nodes are evicted.
    pub fn node_count(&self) -> usize {
        self.handle.graph.node_count()
    }

    /// Whether `id` belongs to a node of this tree that has not been evicted.
    pub fn contains(&self, id: NodeId) -> bool {
        self.handle.graph.contains(id)
    }
}

impl Default for EffectTree {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectNode for EffectTree {
    fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}
