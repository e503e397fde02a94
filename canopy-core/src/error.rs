//! Error Types
//!
//! Every fallible operation in the graph reports one of the errors below.
//! Silent-skip conditions (pending operations that reference a node which has
//! already been disposed by the time `commit()` runs) are not errors and never
//! show up here.

use std::fmt;

use thiserror::Error;

use crate::graph::{ContextName, NodeId};

/// Error type accepted from host-supplied callbacks (setup and teardown).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure to construct an effect. No node is left registered.
#[derive(Debug, Error)]
pub enum ConstructionError {
    /// The builder was finished without a parent.
    #[error("an effect requires a parent node")]
    MissingParent,

    /// The parent is already disposing or disposed.
    #[error("parent {0} is no longer alive")]
    ParentNotAlive(NodeId),

    /// The setup callback returned an error.
    #[error("setup callback failed")]
    Setup(#[source] BoxError),
}

/// A context lookup on a node that has no entry for the requested type.
#[derive(Debug, Clone, Error)]
#[error("context `{context}` is not registered on node {node}")]
pub struct ContextMissingError {
    pub node: NodeId,
    pub context: ContextName,
}

/// A teardown hook that failed during a disposal cascade.
#[derive(Debug)]
pub struct TeardownFailure {
    pub node: NodeId,
    pub error: BoxError,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "teardown of node {} failed: {}", self.node, self.error)
    }
}

/// Aggregated teardown failures of one disposal fan-out.
///
/// Sibling teardowns in the same fan-out still ran, and every node involved
/// still reached `disposed`.
#[derive(Debug, Default, Error)]
#[error("{} teardown hook(s) failed during disposal", .failures.len())]
pub struct CascadeFailure {
    pub failures: Vec<TeardownFailure>,
}

impl CascadeFailure {
    pub(crate) fn push(&mut self, node: NodeId, error: BoxError) {
        self.failures.push(TeardownFailure { node, error });
    }

    pub(crate) fn merge(&mut self, other: CascadeFailure) {
        self.failures.extend(other.failures);
    }

    pub(crate) fn into_result(self) -> Result<(), CascadeFailure> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Nodes whose teardown failed, in the order the failures were collected.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.failures.iter().map(|f| f.node)
    }
}

/// Umbrella error for graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    ContextMissing(#[from] ContextMissingError),

    #[error(transparent)]
    Cascade(#[from] CascadeFailure),

    /// Structural query on a node that has been disposed.
    #[error("node {node} has been disposed")]
    NodeDisposed { node: NodeId },

    /// A structural request that mixes nodes of two different trees.
    #[error("node {node} belongs to a different effect tree")]
    ForeignNode { node: NodeId },
}

/// Invalid driver configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse driver configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid driver configuration: {0}")]
    Invalid(String),
}
