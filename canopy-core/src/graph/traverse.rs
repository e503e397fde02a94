//! Depth-first event traversal over the ownership tree.

use super::event::{Event, Traversal};
use super::{Graph, NodeId};

impl Graph {
    /// Dispatch `event` to `id`'s hook, then to each live child's subtree.
    ///
    /// The lock is only held while reading a node's hook and child list.
    pub(crate) fn emit(
        &self,
        id: NodeId,
        name: &str,
        event: &mut Event,
        global_fields: &[&str],
        traversal: Traversal,
    ) {
        let (hook, children) = {
            let state = self.lock();
            match state.nodes.get(&id) {
                Some(record) if record.is_alive() => {
                    (record.hooks.event(name), record.children.clone())
                }
                _ => return,
            }
        };

        if let Some(hook) = hook {
            hook(event);
        }
        if children.is_empty() {
            return;
        }

        let mut local = event.clone();
        match traversal {
            Traversal::Forward => {
                for child in children {
                    self.emit(child, name, &mut local, global_fields, traversal);
                }
            }
            Traversal::Reversed => {
                for child in children.into_iter().rev() {
                    self.emit(child, name, &mut local, global_fields, traversal);
                }
            }
        }
        event.absorb(&local, global_fields);
    }
}
