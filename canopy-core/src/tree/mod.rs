//! Effect Trees
//!
//! The public handles over the effect graph.
//!
//! - [`EffectTree`]: the root. Owns the pending operations and `commit()`.
//! - [`Effect`]: a node with one or more owning parents.
//! - [`EffectNode`]: what both have in common (events, contexts, disposal).
//! - [`Host`]: capabilities an object wrapped by an effect can opt into.
//!
//! Handles are cheap to clone and do not own their node: dropping a handle
//! never disposes anything. Nodes live until they are disposed explicitly or
//! lose their last parent.

mod effect;
mod host;
mod node;
mod root;

pub use effect::{Effect, EffectBuilder};
pub use host::Host;
pub use node::{EffectNode, NodeHandle};
pub use root::EffectTree;
