//! The contract shared by every node of an effect tree.

use std::any::Any;
use std::sync::Arc;

use crate::error::{ContextMissingError, GraphError};
use crate::graph::{
    Context, ContextName, Disposal, DisposeStatus, Event, Graph, HookTable, NodeId,
    PendingOperation, Teardown, Traversal,
};

/// A reference to one node of a tree. Cheap to clone.
#[derive(Clone)]
pub struct NodeHandle {
    pub(crate) graph: Arc<Graph>,
    pub(crate) id: NodeId,
}

impl NodeHandle {
    /// Whether both handles point into the same tree.
    pub fn same_tree(&self, other: &NodeHandle) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph)
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("status", &self.graph.status(self.id))
            .finish()
    }
}

/// Operations available on the root and on every effect.
///
/// Context registration is deferred to the tree's next `commit()`. Lookups
/// are synchronous and only consult the node's own map, which holds the
/// values pushed down from (or lazily pulled through) its ancestors.
pub trait EffectNode {
    fn handle(&self) -> &NodeHandle;

    fn id(&self) -> NodeId {
        self.handle().id
    }

    fn status(&self) -> DisposeStatus {
        let handle = self.handle();
        handle.graph.status(handle.id)
    }

    fn is_alive(&self) -> bool {
        self.status() == DisposeStatus::Alive
    }

    /// True from the moment disposal starts until it settles.
    fn is_disposing(&self) -> bool {
        self.status() == DisposeStatus::Disposing
    }

    fn is_disposed(&self) -> bool {
        self.status() == DisposeStatus::Disposed
    }

    /// Dispatch to this node's hook, then depth-first to live children in
    /// attachment order.
    fn emit(&self, name: &str, event: &mut Event, global_fields: &[&str]) {
        let handle = self.handle();
        handle
            .graph
            .emit(handle.id, name, event, global_fields, Traversal::Forward);
    }

    /// Like [`emit`](Self::emit), but children are visited latest first.
    fn emit_reversed(&self, name: &str, event: &mut Event, global_fields: &[&str]) {
        let handle = self.handle();
        handle
            .graph
            .emit(handle.id, name, event, global_fields, Traversal::Reversed);
    }

    /// Register the hook for `event` on this node, replacing any previous one.
    fn on<F>(&self, event: &str, hook: F)
    where
        F: Fn(&mut Event) + Send + Sync + 'static,
        Self: Sized,
    {
        let mut hooks = HookTable::default();
        hooks.on(event, hook);
        let handle = self.handle();
        handle.graph.set_hooks(handle.id, hooks);
    }

    /// Register a hook called whenever a `T` context becomes visible here.
    fn on_context<T, F>(&self, hook: F)
    where
        T: Any,
        F: Fn(&Context) + Send + Sync + 'static,
        Self: Sized,
    {
        let mut hooks = HookTable::default();
        hooks.on_context::<T, _>(hook);
        let handle = self.handle();
        handle.graph.set_hooks(handle.id, hooks);
    }

    /// Queue registration of `value` as a context on this node.
    fn add_context<T>(&self, value: T) -> Context
    where
        T: Any + Send + Sync,
        Self: Sized,
    {
        let context = Context::new(value);
        self.add_context_value(context.clone());
        context
    }

    fn add_context_value(&self, context: Context) {
        let handle = self.handle();
        handle.graph.enqueue(PendingOperation::AddContext {
            target: handle.id,
            context,
        });
    }

    /// Queue removal of the `T` context from this node.
    fn remove_context<T: Any>(&self)
    where
        Self: Sized,
    {
        self.remove_context_named(ContextName::of::<T>());
    }

    fn remove_context_named(&self, name: ContextName) {
        let handle = self.handle();
        handle.graph.enqueue(PendingOperation::RemoveContext {
            target: handle.id,
            context: name,
        });
    }

    fn has_context<T: Any>(&self) -> bool
    where
        Self: Sized,
    {
        let handle = self.handle();
        handle.graph.has_context(handle.id, ContextName::of::<T>())
    }

    /// The `T` context visible on this node.
    fn context<T>(&self) -> Result<Arc<T>, ContextMissingError>
    where
        T: Any + Send + Sync,
        Self: Sized,
    {
        let handle = self.handle();
        let name = ContextName::of::<T>();
        let context = handle.graph.context(handle.id, name)?;
        context.downcast::<T>().ok_or(ContextMissingError {
            node: handle.id,
            context: name,
        })
    }

    /// Every context visible on this node.
    fn contexts(&self) -> Vec<Context> {
        let handle = self.handle();
        handle.graph.contexts(handle.id)
    }

    /// Start disposing this node. Repeated calls are no-ops.
    fn dispose(&self) -> Disposal {
        let handle = self.handle();
        handle.graph.dispose(handle.id)
    }

    /// Set the teardown hook. A hook set later runs first and then calls
    /// through to the earlier one.
    fn set_destroy(&self, teardown: Teardown) {
        let handle = self.handle();
        handle.graph.set_teardown(handle.id, teardown);
    }

    fn children(&self) -> Result<Vec<NodeId>, GraphError> {
        let handle = self.handle();
        handle.graph.query(handle.id, |record| record.children.clone())
    }

    /// Effects that declared a dependency on this node or one of its contexts.
    fn dependents(&self) -> Result<Vec<NodeId>, GraphError> {
        let handle = self.handle();
        handle.graph.query(handle.id, |record| record.all_dependents())
    }
}

impl EffectNode for NodeHandle {
    fn handle(&self) -> &NodeHandle {
        self
    }
}
