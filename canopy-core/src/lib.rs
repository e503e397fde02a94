//! Canopy Core
//!
//! This crate provides the effect dependency graph that long-lived reactive
//! resources (timers, event subscriptions, platform handles) are built on.
//! It implements:
//!
//! - Hierarchical, reference-counted ownership between effects
//! - Context values inherited from ancestors
//! - Deferred structural edits applied by a deterministic `commit()`
//! - Disposal cascades with concurrent, joined teardown
//! - Event propagation through the ownership tree
//!
//! # Architecture
//!
//! - `graph`: node arena, pending-operation queues, commit, contexts,
//!   disposal and traversal
//! - `tree`: the public handles (`EffectTree`, `Effect`, `EffectNode`, `Host`)
//! - `driver`: fixed-step tick loop that fans update/render events down a tree
//! - `config`: driver configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use canopy_core::{Effect, EffectNode, EffectTree, Teardown};
//!
//! struct Theme(&'static str);
//!
//! let tree = EffectTree::new();
//! tree.add_context(Theme("dark"));
//! tree.commit();
//!
//! let timer = Effect::builder()
//!     .parent(&tree)
//!     .setup(|_| {
//!         let handle = start_timer();
//!         Ok::<_, BoxError>(Some(Teardown::infallible(move || handle.cancel())))
//!     })
//!     .build()?;
//! tree.commit();
//!
//! assert_eq!(timer.context::<Theme>()?.0, "dark");
//!
//! // Runs the teardown, then marks the effect disposed.
//! timer.dispose().await?;
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod graph;
pub mod tree;

pub use config::DriverConfig;
pub use driver::{DriverReport, FixedStepDriver};
pub use error::{
    BoxError, CascadeFailure, ConfigError, ConstructionError, ContextMissingError, GraphError,
    TeardownFailure,
};
pub use graph::{
    CommitSummary, Context, ContextName, Dependency, Disposal, DisposeStatus, Event, HookTable,
    NodeId, PendingOperation, Teardown, Traversal,
};
pub use tree::{Effect, EffectBuilder, EffectNode, EffectTree, Host, NodeHandle};
