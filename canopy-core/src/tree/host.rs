//! Hosts
//!
//! A host is the object an effect was created for: a timer wrapper, a
//! rendered element, a window listener. It opts into capabilities once, at
//! construction, instead of being probed by name on every event.

use std::sync::Arc;

use crate::graph::{Context, HookTable};

/// Capabilities a host can offer to the effect that wraps it.
pub trait Host: Send + Sync + 'static {
    /// Register the event and context hooks this host answers to.
    ///
    /// Hooks receive only the event; capture `self` to act as the receiver.
    fn register_hooks(self: Arc<Self>, hooks: &mut HookTable) {
        let _ = hooks;
    }

    /// A context value the host publishes on its own node, usually itself.
    fn provided_context(self: Arc<Self>) -> Option<Context> {
        None
    }
}
