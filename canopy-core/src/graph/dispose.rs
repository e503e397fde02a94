//! Disposal
//!
//! Disposing a node happens in two phases.
//!
//! 1. **Mark** (synchronous, under the lock): the node and every descendant or
//!    dependent that will not survive flip to `Disposing`. Status queries
//!    anywhere in the subtree are correct before any teardown runs.
//!
//! 2. **Cascade** (async): the node's teardown starts, its children are
//!    released (children with another live parent only lose the contexts this
//!    node contributed), and the doomed children and dependents cascade
//!    concurrently. When everything has settled the node is evicted and reads
//!    as `Disposed`.
//!
//! There is no cancellation. A node that started disposing always finishes:
//! every node the mark pass flags is parked on the tree until its cascade is
//! claimed, so dropping a [`Disposal`] only hands the work to the next
//! `settle()` (or the next `dispose()` call on the same node).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures_util::future::{self, BoxFuture, FutureExt};
use tracing::{debug, warn};

use super::{Graph, NodeId};
use crate::error::{BoxError, CascadeFailure};

type TeardownFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// A teardown hook, run once when its node is disposed.
pub struct Teardown(TeardownFn);

impl Teardown {
    /// A synchronous teardown.
    pub fn new<F, E>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self(Box::new(move || {
            let result = f().map_err(Into::into);
            future::ready(result).boxed()
        }))
    }

    /// A teardown that cannot fail.
    pub fn infallible<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move || {
            f();
            Ok::<(), BoxError>(())
        })
    }

    /// An asynchronous teardown.
    pub fn future<F, Fut, E>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self(Box::new(move || {
            f().map(|result| result.map_err(Into::into)).boxed()
        }))
    }

    /// Compose with an older teardown: `self` runs first, then `previous`.
    /// The first error is reported; `previous` runs either way.
    pub fn then(self, previous: Teardown) -> Self {
        Self(Box::new(move || {
            async move {
                let first = (self.0)().await;
                let second = (previous.0)().await;
                first.and(second)
            }
            .boxed()
        }))
    }

    pub(crate) fn run(self) -> BoxFuture<'static, Result<(), BoxError>> {
        (self.0)()
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Teardown")
    }
}

/// Completion handle of a disposal cascade.
///
/// The cascade only makes progress while this future is polled. Dropping it
/// unpolled leaves the node `Disposing` until the tree settles.
#[must_use = "a disposal cascade does nothing unless awaited"]
pub struct Disposal(BoxFuture<'static, Result<(), CascadeFailure>>);

impl Disposal {
    /// A disposal that has nothing left to do.
    pub(crate) fn settled() -> Self {
        Self(future::ready(Ok(())).boxed())
    }
}

impl Future for Disposal {
    type Output = Result<(), CascadeFailure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

impl fmt::Debug for Disposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Disposal")
    }
}

impl Graph {
    /// Start disposing `id`, or drive a cascade nobody has claimed yet.
    /// Calls on a node whose cascade is running or finished are no-ops.
    pub(crate) fn dispose(self: &Arc<Self>, id: NodeId) -> Disposal {
        let unclaimed = {
            let mut state = self.lock();
            state.mark_disposing(id)
                || state
                    .nodes
                    .get(&id)
                    .is_some_and(|record| !record.cascade_started)
        };
        if !unclaimed {
            return Disposal::settled();
        }
        Disposal(self.cascade(id))
    }

    /// Install a teardown hook, composing with any hook already set.
    pub(crate) fn set_teardown(&self, id: NodeId, teardown: Teardown) {
        let mut state = self.lock();
        match state.nodes.get_mut(&id) {
            Some(record) if !record.cascade_started => {
                record.teardown = Some(match record.teardown.take() {
                    Some(previous) => teardown.then(previous),
                    None => teardown,
                });
            }
            _ => debug!(node = %id, "teardown set after disposal started, dropped"),
        }
    }

    /// Drive every marked node whose cascade has not been claimed to
    /// completion: disposals triggered by `commit()`, dropped `Disposal`s and
    /// nodes detached from a disposing parent before its cascade reached them.
    pub(crate) fn settle(self: &Arc<Self>) -> BoxFuture<'static, Result<(), CascadeFailure>> {
        let graph = Arc::clone(self);
        async move {
            let mut failure = CascadeFailure::default();
            loop {
                let parked = {
                    let mut state = graph.lock();
                    state.prune_parked();
                    std::mem::take(&mut state.parked)
                };
                if parked.is_empty() {
                    break;
                }
                let cascades = parked.into_iter().map(|id| graph.cascade(id));
                for result in future::join_all(cascades).await {
                    if let Err(err) = result {
                        failure.merge(err);
                    }
                }
            }
            failure.into_result()
        }
        .boxed()
    }

    /// Async phase of disposal. Only the first caller for a node does the work.
    fn cascade(self: &Arc<Self>, id: NodeId) -> BoxFuture<'static, Result<(), CascadeFailure>> {
        let graph = Arc::clone(self);
        async move {
            let claimed = {
                let mut state = graph.lock();
                match state.nodes.get_mut(&id) {
                    Some(record) if !record.cascade_started => {
                        record.cascade_started = true;
                        Some((
                            record.teardown.take(),
                            record.children.clone(),
                            record.all_dependents(),
                        ))
                    }
                    _ => None,
                }
            };
            let Some((teardown, children, dependents)) = claimed else {
                return Ok(());
            };

            let teardown = async move {
                match teardown {
                    Some(teardown) => teardown.run().await,
                    None => Ok(()),
                }
            };

            // Polled after the teardown, so the hook still sees its children.
            let fanout = {
                let graph = Arc::clone(&graph);
                async move {
                    let doomed: Vec<NodeId> = {
                        let mut state = graph.lock();
                        let mut doomed: Vec<NodeId> = children
                            .into_iter()
                            .filter_map(|child| state.release_child(id, child))
                            .collect();
                        doomed.extend(dependents.into_iter().filter(|d| state.doom(*d)));
                        doomed
                    };
                    future::join_all(doomed.into_iter().map(|n| graph.cascade(n))).await
                }
            };

            let (own, cascades) = future::join(teardown, fanout).await;

            let mut failure = CascadeFailure::default();
            if let Err(error) = own {
                warn!(node = %id, %error, "teardown failed");
                failure.push(id, error);
            }
            for result in cascades {
                if let Err(err) = result {
                    failure.merge(err);
                }
            }

            graph.lock().finalize(id);
            debug!(node = %id, "disposed");
            failure.into_result()
        }
        .boxed()
    }
}
