//! Effect Implementation
//!
//! An Effect is a scoped, disposable unit of behaviour owned by one or more
//! parents.
//!
//! # Lifecycle
//!
//! 1. Construction registers the node and runs the optional setup callback.
//!    If setup fails nothing stays registered. Attachment to the parent is
//!    queued and happens on the next `commit()`.
//!
//! 2. Parents can be added and removed at any time. Removing the last parent
//!    disposes the effect.
//!
//! 3. Disposal runs the teardown hook, releases children and disposes
//!    dependents. See [`crate::graph`] for the two-phase cascade.
//!
//! # Dependencies
//!
//! Besides its parents, an effect can depend on other nodes. A dependency on
//! a node disposes the effect when that node is disposed; a dependency on a
//! context of a node also disposes it when the context is removed.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, ConstructionError, GraphError};
use crate::graph::{
    ContextName, Dependency, Event, HookTable, NodeId, NodeKind, NodeRecord, PendingOperation,
    Teardown,
};

use super::host::Host;
use super::node::{EffectNode, NodeHandle};

type SetupFn = Box<dyn FnOnce(&Effect) -> Result<Option<Teardown>, BoxError>>;

/// A node of an effect tree with one or more owning parents.
#[derive(Clone)]
pub struct Effect {
    handle: NodeHandle,
}

impl Effect {
    /// Create an effect owned by `parent`.
    pub fn new(parent: &impl EffectNode) -> Result<Self, ConstructionError> {
        Self::builder().parent(parent).build()
    }

    pub fn builder() -> EffectBuilder {
        EffectBuilder::default()
    }

    /// Queue `parent` as an additional owner.
    pub fn add_parent(&self, parent: &impl EffectNode) -> Result<(), GraphError> {
        let parent = self.same_tree(parent)?;
        self.handle.graph.enqueue(PendingOperation::AddParent {
            child: self.handle.id,
            parent,
        });
        Ok(())
    }

    /// Queue removal of `parent`. The effect is disposed once it has no parent.
    pub fn remove_parent(&self, parent: &impl EffectNode) -> Result<(), GraphError> {
        let parent = self.same_tree(parent)?;
        self.handle.graph.enqueue(PendingOperation::RemoveParent {
            child: self.handle.id,
            parent,
        });
        Ok(())
    }

    /// Queue a dependency on `node`.
    pub fn add_dependency(&self, node: &impl EffectNode) -> Result<(), GraphError> {
        let node = self.same_tree(node)?;
        self.add_dependency_raw(Dependency::Node(node));
        Ok(())
    }

    /// Queue a dependency on the `T` context as registered on `node`.
    pub fn add_context_dependency<T: Any>(&self, node: &impl EffectNode) -> Result<(), GraphError> {
        let node = self.same_tree(node)?;
        self.add_dependency_raw(Dependency::Context(node, ContextName::of::<T>()));
        Ok(())
    }

    pub fn remove_dependency(&self, node: &impl EffectNode) -> Result<(), GraphError> {
        let node = self.same_tree(node)?;
        self.remove_dependency_raw(Dependency::Node(node));
        Ok(())
    }

    pub fn remove_context_dependency<T: Any>(
        &self,
        node: &impl EffectNode,
    ) -> Result<(), GraphError> {
        let node = self.same_tree(node)?;
        self.remove_dependency_raw(Dependency::Context(node, ContextName::of::<T>()));
        Ok(())
    }

    /// Queue a dependency by id. Ids unknown to this tree are skipped at commit.
    pub fn add_dependency_raw(&self, dependency: Dependency) {
        self.handle.graph.enqueue(PendingOperation::AddDependency {
            effect: self.handle.id,
            dependency,
        });
    }

    pub fn remove_dependency_raw(&self, dependency: Dependency) {
        self.handle.graph.enqueue(PendingOperation::RemoveDependency {
            effect: self.handle.id,
            dependency,
        });
    }

    pub fn parents(&self) -> Result<Vec<NodeId>, GraphError> {
        self.handle
            .graph
            .query(self.handle.id, |record| record.parents.to_vec())
    }

    pub fn dependencies(&self) -> Result<Vec<Dependency>, GraphError> {
        self.handle
            .graph
            .query(self.handle.id, |record| record.dependencies.clone())
    }

    fn same_tree(&self, other: &impl EffectNode) -> Result<NodeId, GraphError> {
        let other = other.handle();
        if self.handle.same_tree(other) {
            Ok(other.id)
        } else {
            Err(GraphError::ForeignNode { node: other.id })
        }
    }
}

impl EffectNode for Effect {
    fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.handle.id)
            .field("status", &self.status())
            .finish()
    }
}

/// Builder for [`Effect`].
#[derive(Default)]
pub struct EffectBuilder {
    parent: Option<(NodeHandle, Option<ContextName>)>,
    setup: Option<SetupFn>,
    host: Option<Arc<dyn Host>>,
    hooks: HookTable,
}

impl EffectBuilder {
    /// The owning parent. Required.
    pub fn parent(mut self, parent: &impl EffectNode) -> Self {
        self.parent = Some((parent.handle().clone(), None));
        self
    }

    /// Attach to `parent` and depend on the `T` context registered on it.
    pub fn parent_with_context<T: Any>(mut self, parent: &impl EffectNode) -> Self {
        self.parent = Some((parent.handle().clone(), Some(ContextName::of::<T>())));
        self
    }

    /// Run `setup` during construction. A returned teardown becomes the
    /// effect's destroy hook; an error aborts construction.
    pub fn setup<F, E>(mut self, setup: F) -> Self
    where
        F: FnOnce(&Effect) -> Result<Option<Teardown>, E> + 'static,
        E: Into<BoxError>,
    {
        self.setup = Some(Box::new(move |effect| setup(effect).map_err(Into::into)));
        self
    }

    pub fn host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    /// Register an event hook directly on the new node.
    pub fn on<F>(mut self, event: &str, hook: F) -> Self
    where
        F: Fn(&mut Event) + Send + Sync + 'static,
    {
        self.hooks.on(event, hook);
        self
    }

    pub fn build(self) -> Result<Effect, ConstructionError> {
        let (parent, context) = self.parent.ok_or(ConstructionError::MissingParent)?;
        let graph = parent.graph.clone();
        if !parent.is_alive() {
            return Err(ConstructionError::ParentNotAlive(parent.id));
        }

        let mut hooks = self.hooks;
        if let Some(host) = &self.host {
            Arc::clone(host).register_hooks(&mut hooks);
        }

        let id = NodeId::next();
        let mut record = NodeRecord::new(id, NodeKind::Effect);
        record.hooks = hooks;
        graph.insert(record);

        let effect = Effect {
            handle: NodeHandle {
                graph: graph.clone(),
                id,
            },
        };

        if let Some(setup) = self.setup {
            match setup(&effect) {
                Ok(Some(teardown)) => graph.set_teardown(id, teardown),
                Ok(None) => {}
                Err(err) => {
                    graph.discard(id);
                    return Err(ConstructionError::Setup(err));
                }
            }
        }

        graph.enqueue(PendingOperation::AddParent {
            child: id,
            parent: parent.id,
        });
        if let Some(name) = context {
            graph.enqueue(PendingOperation::AddDependency {
                effect: id,
                dependency: Dependency::Context(parent.id, name),
            });
        }
        if let Some(context) = self.host.and_then(|host| host.provided_context()) {
            graph.enqueue(PendingOperation::AddContext {
                target: id,
                context,
            });
        }

        tracing::debug!(node = %id, parent = %parent.id, "effect created");
        Ok(effect)
    }
}
