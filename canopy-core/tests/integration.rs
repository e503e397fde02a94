//! Integration Tests for the Effect Graph
//!
//! These tests verify that ownership, contexts, commit ordering, disposal and
//! event propagation work together correctly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use canopy_core::{
    BoxError, Context, ContextMissingError, ContextName, Dependency, Effect, EffectNode,
    EffectTree, Event, GraphError, HookTable, Host, Teardown,
};

#[derive(Debug, PartialEq)]
struct Theme(&'static str);

struct Session;

fn counting_teardown(count: &Arc<AtomicUsize>) -> Teardown {
    let count = count.clone();
    Teardown::infallible(move || {
        count.fetch_add(1, Ordering::SeqCst);
    })
}

fn recorder() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn record_hook(log: &Arc<Mutex<Vec<String>>>, name: &str) -> impl Fn(&mut Event) + Send + Sync {
    let log = log.clone();
    let name = name.to_owned();
    move |_| log.lock().push(name.clone())
}

/// Disposing a parent disposes its child once the cascade settles.
#[tokio::test]
async fn disposing_parent_disposes_child() {
    let tree = EffectTree::new();
    let e1 = Effect::new(&tree).unwrap();
    let e2 = Effect::new(&e1).unwrap();
    tree.commit();

    e1.dispose().await.unwrap();

    assert!(e1.is_disposed());
    assert!(e2.is_disposed());
    assert_eq!(tree.node_count(), 1);
}

/// A context registered before a child exists is visible to it after commit.
#[tokio::test]
async fn late_child_sees_existing_context() {
    let tree = EffectTree::new();
    tree.add_context(Theme("v"));
    tree.commit();

    let child = Effect::new(&tree).unwrap();
    tree.commit();

    assert_eq!(*child.context::<Theme>().unwrap(), Theme("v"));
}

/// An effect stays alive until its last parent is removed.
#[tokio::test]
async fn parents_are_reference_counted() {
    let tree = EffectTree::new();
    let p1 = Effect::new(&tree).unwrap();
    let p2 = Effect::new(&tree).unwrap();
    tree.commit();

    let teardowns = Arc::new(AtomicUsize::new(0));
    let effect = Effect::new(&p1).unwrap();
    effect.set_destroy(counting_teardown(&teardowns));
    effect.add_parent(&p2).unwrap();
    tree.commit();
    assert_eq!(effect.parents().unwrap(), vec![p1.id(), p2.id()]);

    effect.remove_parent(&p1).unwrap();
    let summary = tree.commit();
    assert_eq!(summary.disposals, 0);
    assert!(effect.is_alive());
    assert_eq!(effect.parents().unwrap(), vec![p2.id()]);

    effect.remove_parent(&p2).unwrap();
    let summary = tree.commit();
    assert_eq!(summary.disposals, 1);
    assert!(effect.is_disposing());
    assert_eq!(teardowns.load(Ordering::SeqCst), 0);

    tree.settle().await.unwrap();
    assert!(effect.is_disposed());
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

/// Calling dispose twice runs the teardown exactly once.
#[tokio::test]
async fn dispose_is_idempotent() {
    let tree = EffectTree::new();
    let effect = Effect::new(&tree).unwrap();
    tree.commit();

    let teardowns = Arc::new(AtomicUsize::new(0));
    effect.set_destroy(counting_teardown(&teardowns));

    let first = effect.dispose();
    let second = effect.dispose();
    assert!(effect.is_disposing());

    second.await.unwrap();
    first.await.unwrap();
    effect.dispose().await.unwrap();

    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert!(effect.is_disposed());
}

/// A queued add/remove pair for the same edge ends detached, whatever the
/// order the requests were made in.
#[tokio::test]
async fn removals_win_within_a_batch() {
    let tree = EffectTree::new();
    let parent = Effect::new(&tree).unwrap();
    let child = Effect::new(&parent).unwrap();
    tree.commit();

    child.add_parent(&parent).unwrap();
    child.remove_parent(&parent).unwrap();
    tree.commit();

    assert!(!parent.children().unwrap().contains(&child.id()));
    assert!(child.is_disposing());

    tree.settle().await.unwrap();
    assert!(child.is_disposed());
}

/// Contexts reach every descendant on commit and disappear on removal.
#[tokio::test]
async fn contexts_propagate_and_retract() {
    let tree = EffectTree::new();
    let a = Effect::new(&tree).unwrap();
    let b = Effect::new(&a).unwrap();
    tree.commit();

    tree.add_context(Theme("dark"));
    assert!(!b.has_context::<Theme>());
    tree.commit();

    assert!(a.has_context::<Theme>());
    assert_eq!(b.context::<Theme>().unwrap().0, "dark");

    tree.remove_context::<Theme>();
    tree.commit();

    let err: ContextMissingError = b.context::<Theme>().unwrap_err();
    assert_eq!(err.node, b.id());
    assert!(!a.has_context::<Theme>());
}

/// The most recent registration of a context type wins, and a descendant's
/// own value shadows the inherited one.
#[tokio::test]
async fn context_overwrite_and_shadowing() {
    let tree = EffectTree::new();
    let a = Effect::new(&tree).unwrap();
    let b = Effect::new(&a).unwrap();
    tree.commit();

    tree.add_context(Theme("light"));
    tree.add_context(Theme("dark"));
    a.add_context(Theme("custom"));
    tree.commit();

    assert_eq!(tree.context::<Theme>().unwrap().0, "dark");
    assert_eq!(a.context::<Theme>().unwrap().0, "custom");
    assert_eq!(b.context::<Theme>().unwrap().0, "custom");

    // Dropping the override re-exposes the inherited value.
    a.remove_context::<Theme>();
    tree.commit();
    assert_eq!(a.context::<Theme>().unwrap().0, "dark");
    assert_eq!(b.context::<Theme>().unwrap().0, "dark");
}

/// Children and dependents all reach `Disposed` when the root disposal settles.
#[tokio::test]
async fn cascade_reaches_children_and_dependents() {
    let tree = EffectTree::new();
    let node = Effect::new(&tree).unwrap();
    let c1 = Effect::new(&node).unwrap();
    let c2 = Effect::new(&node).unwrap();
    let d1 = Effect::new(&tree).unwrap();
    d1.add_dependency(&node).unwrap();
    tree.commit();
    assert_eq!(node.dependents().unwrap(), vec![d1.id()]);

    node.dispose().await.unwrap();

    for effect in [&node, &c1, &c2, &d1] {
        assert!(effect.is_disposed(), "{effect:?} should be disposed");
    }
    assert!(tree.children().unwrap().is_empty());
}

/// The whole doomed subtree reads as disposing before any teardown runs.
#[tokio::test]
async fn subtree_is_marked_before_teardown() {
    let tree = EffectTree::new();
    let parent = Effect::new(&tree).unwrap();
    let child = Effect::new(&parent).unwrap();
    tree.commit();

    let observed = recorder();
    let (o, c) = (observed.clone(), child.clone());
    parent.set_destroy(Teardown::infallible(move || {
        o.lock().push(format!("child disposing: {}", c.is_disposing()));
    }));
    let (o, p) = (observed.clone(), parent.clone());
    child.set_destroy(Teardown::infallible(move || {
        o.lock().push(format!("parent disposing: {}", p.is_disposing()));
    }));

    let disposal = parent.dispose();
    assert!(parent.is_disposing());
    assert!(child.is_disposing());
    disposal.await.unwrap();

    assert_eq!(
        *observed.lock(),
        vec!["child disposing: true", "parent disposing: true"]
    );
}

/// One failing teardown does not stop its siblings, and every node still
/// reaches `Disposed`.
#[tokio::test]
async fn teardown_failures_are_aggregated() {
    let tree = EffectTree::new();
    let parent = Effect::new(&tree).unwrap();
    let failing = Effect::new(&parent).unwrap();
    let healthy = Effect::new(&parent).unwrap();
    tree.commit();

    failing.set_destroy(Teardown::new(|| Err::<(), _>("handle already closed")));
    let teardowns = Arc::new(AtomicUsize::new(0));
    healthy.set_destroy(counting_teardown(&teardowns));

    let failure = parent.dispose().await.unwrap_err();

    assert_eq!(failure.nodes().collect::<Vec<_>>(), vec![failing.id()]);
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert!(failing.is_disposed());
    assert!(healthy.is_disposed());
    assert!(parent.is_disposed());
}

/// Sibling teardowns run concurrently: a teardown waiting on its sibling does
/// not deadlock the cascade.
#[tokio::test]
async fn sibling_teardowns_fan_out() {
    let tree = EffectTree::new();
    let parent = Effect::new(&tree).unwrap();
    let waiting = Effect::new(&parent).unwrap();
    let signalling = Effect::new(&parent).unwrap();
    tree.commit();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    waiting.set_destroy(Teardown::future(move || rx));
    signalling.set_destroy(Teardown::infallible(move || {
        let _ = tx.send(());
    }));

    parent.dispose().await.unwrap();
    assert!(waiting.is_disposed());
    assert!(signalling.is_disposed());
}

/// Later teardowns run first and call through to earlier ones.
#[tokio::test]
async fn destroy_hooks_compose() {
    let tree = EffectTree::new();
    let effect = Effect::new(&tree).unwrap();
    tree.commit();

    let log = recorder();
    let l = log.clone();
    effect.set_destroy(Teardown::infallible(move || l.lock().push("first".into())));
    let l = log.clone();
    effect.set_destroy(Teardown::infallible(move || l.lock().push("second".into())));

    effect.dispose().await.unwrap();
    assert_eq!(*log.lock(), vec!["second", "first"]);
}

/// A child with another live parent survives, losing only the contexts the
/// disposed parent contributed.
#[tokio::test]
async fn shared_child_survives_one_parent() {
    let tree = EffectTree::new();
    let a = Effect::new(&tree).unwrap();
    let b = Effect::new(&tree).unwrap();
    a.add_context(Theme("from a"));
    tree.commit();

    let shared = Effect::new(&a).unwrap();
    shared.add_parent(&b).unwrap();
    tree.commit();
    assert_eq!(shared.context::<Theme>().unwrap().0, "from a");

    a.dispose().await.unwrap();

    assert!(shared.is_alive());
    assert_eq!(shared.parents().unwrap(), vec![b.id()]);
    assert!(shared.context::<Theme>().is_err());
}

/// Attaching to a parent with a context dependency disposes the effect when
/// the parent drops that context.
#[tokio::test]
async fn context_dependency_follows_the_context() {
    let tree = EffectTree::new();
    tree.add_context(Session);
    tree.commit();

    let effect = Effect::builder()
        .parent_with_context::<Session>(&tree)
        .build()
        .unwrap();
    tree.commit();
    assert_eq!(
        effect.dependencies().unwrap(),
        vec![Dependency::Context(tree.id(), ContextName::of::<Session>())]
    );

    tree.remove_context::<Session>();
    let summary = tree.commit();
    assert_eq!(summary.disposals, 1);

    tree.settle().await.unwrap();
    assert!(effect.is_disposed());
}

/// Edits queued against a node that has since been disposed are skipped.
#[tokio::test]
async fn stale_operations_are_skipped() {
    let tree = EffectTree::new();
    let effect = Effect::new(&tree).unwrap();
    tree.commit();
    effect.dispose().await.unwrap();

    effect.add_context(Theme("late"));
    effect.add_parent(&tree).unwrap();
    let summary = tree.commit();

    assert_eq!(summary.applied, 2);
    assert_eq!(summary.skipped, 2);
    assert!(matches!(
        effect.children(),
        Err(GraphError::NodeDisposed { node }) if node == effect.id()
    ));
}

/// `emit` visits depth-first in attachment order, `emit_reversed` latest
/// child first.
#[tokio::test]
async fn emit_orders() {
    let tree = EffectTree::new();
    let log = recorder();

    let a = Effect::builder()
        .parent(&tree)
        .on("ping", record_hook(&log, "a"))
        .build()
        .unwrap();
    let _a1 = Effect::builder()
        .parent(&a)
        .on("ping", record_hook(&log, "a1"))
        .build()
        .unwrap();
    let _b = Effect::builder()
        .parent(&tree)
        .on("ping", record_hook(&log, "b"))
        .build()
        .unwrap();
    tree.on("ping", record_hook(&log, "root"));
    tree.commit();

    tree.emit("ping", &mut Event::new(), &[]);
    assert_eq!(*log.lock(), vec!["root", "a", "a1", "b"]);

    log.lock().clear();
    tree.emit_reversed("ping", &mut Event::new(), &[]);
    assert_eq!(*log.lock(), vec!["root", "b", "a", "a1"]);
}

/// Capturing is advisory: later siblings still see the event, and the flag
/// comes back to the caller. Only global fields are copied back.
#[tokio::test]
async fn capture_does_not_halt_propagation() {
    let tree = EffectTree::new();
    let visited = Arc::new(AtomicUsize::new(0));

    let _front = Effect::builder()
        .parent(&tree)
        .on("pointer", |event| {
            event.capture();
            event.set("hit", "front");
            event.set("scratch", 1);
        })
        .build()
        .unwrap();
    let v = visited.clone();
    let _back = Effect::builder()
        .parent(&tree)
        .on("pointer", move |event| {
            assert!(event.is_captured());
            v.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    tree.commit();

    let mut event = Event::new().with("x", 10);
    tree.emit("pointer", &mut event, &["hit"]);

    assert_eq!(visited.load(Ordering::SeqCst), 1);
    assert!(event.is_captured());
    assert_eq!(event.get("hit"), Some(&json!("front")));
    assert_eq!(event.get("scratch"), None);
    assert_eq!(event.get("x"), Some(&json!(10)));
}

/// Disposing nodes no longer receive events.
#[tokio::test]
async fn disposing_nodes_are_skipped_by_emit() {
    let tree = EffectTree::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let effect = Effect::builder()
        .parent(&tree)
        .on("update", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    tree.commit();

    tree.emit("update", &mut Event::new(), &[]);
    let disposal = effect.dispose();
    tree.emit("update", &mut Event::new(), &[]);
    disposal.await.unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

struct Timer {
    ticks: AtomicUsize,
}

impl Host for Timer {
    fn register_hooks(self: Arc<Self>, hooks: &mut HookTable) {
        hooks.on("update", move |_| {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        });
    }

    fn provided_context(self: Arc<Self>) -> Option<Context> {
        Some(Context::from_arc(self))
    }
}

/// A host answers events through its hooks and publishes itself as a context
/// for the subtree.
#[tokio::test]
async fn host_capabilities() {
    let tree = EffectTree::new();
    let timer = Arc::new(Timer {
        ticks: AtomicUsize::new(0),
    });

    let effect = Effect::builder()
        .parent(&tree)
        .host(timer.clone())
        .build()
        .unwrap();
    let child = Effect::new(&effect).unwrap();
    tree.commit();

    tree.emit("update", &mut Event::new(), &[]);
    assert_eq!(timer.ticks.load(Ordering::SeqCst), 1);

    assert!(Arc::ptr_eq(&effect.context::<Timer>().unwrap(), &timer));
    assert!(Arc::ptr_eq(&child.context::<Timer>().unwrap(), &timer));
}

/// Context hooks run when a value becomes visible on the node.
#[tokio::test]
async fn context_hooks_fire_on_push() {
    let tree = EffectTree::new();
    let effect = Effect::new(&tree).unwrap();
    tree.commit();

    let seen = recorder();
    let s = seen.clone();
    effect.on_context::<Theme, _>(move |ctx| {
        if let Some(theme) = ctx.downcast::<Theme>() {
            s.lock().push(theme.0.to_owned());
        }
    });

    tree.add_context(Theme("dark"));
    tree.commit();
    tree.add_context(Theme("light"));
    tree.commit();

    assert_eq!(*seen.lock(), vec!["dark", "light"]);
}

/// Setup may register contexts and hooks on the effect it builds.
#[tokio::test]
async fn setup_can_configure_the_effect() {
    let tree = EffectTree::new();
    let effect = Effect::builder()
        .parent(&tree)
        .setup(|effect| {
            effect.add_context(Theme("from setup"));
            Ok::<_, BoxError>(None)
        })
        .build()
        .unwrap();
    let child = Effect::new(&effect).unwrap();
    tree.commit();

    assert_eq!(child.context::<Theme>().unwrap().0, "from setup");
}

/// Disposing the root tears down the entire graph.
#[tokio::test]
async fn disposing_the_root_tears_everything_down() {
    let tree = EffectTree::new();
    let teardowns = Arc::new(AtomicUsize::new(0));

    let mut effects = Vec::new();
    for _ in 0..3 {
        let parent = Effect::new(&tree).unwrap();
        parent.set_destroy(counting_teardown(&teardowns));
        let child = Effect::new(&parent).unwrap();
        child.set_destroy(counting_teardown(&teardowns));
        effects.push(parent);
        effects.push(child);
    }
    tree.commit();
    assert_eq!(tree.node_count(), 7);

    tree.dispose().await.unwrap();

    assert_eq!(teardowns.load(Ordering::SeqCst), 6);
    assert!(effects.iter().all(|e| e.is_disposed()));
    assert_eq!(tree.node_count(), 0);
}

/// Removing a dependency means the dependent outlives the node it used to
/// depend on.
#[tokio::test]
async fn removed_dependency_no_longer_cascades() {
    let tree = EffectTree::new();
    let source = Effect::new(&tree).unwrap();
    let watcher = Effect::new(&tree).unwrap();
    watcher.add_dependency(&source).unwrap();
    tree.commit();
    assert_eq!(watcher.dependencies().unwrap(), vec![Dependency::Node(source.id())]);

    watcher.remove_dependency(&source).unwrap();
    tree.commit();
    assert!(source.dependents().unwrap().is_empty());

    source.dispose().await.unwrap();
    assert!(watcher.is_alive());
    assert!(watcher.dependencies().unwrap().is_empty());
}

/// A child detached from a parent that is already disposing still runs its
/// teardown once the tree settles.
#[tokio::test]
async fn child_detached_mid_disposal_still_finishes() {
    let tree = EffectTree::new();
    let parent = Effect::new(&tree).unwrap();
    let child = Effect::new(&parent).unwrap();
    tree.commit();

    let teardowns = Arc::new(AtomicUsize::new(0));
    child.set_destroy(counting_teardown(&teardowns));

    let disposal = parent.dispose();
    child.remove_parent(&parent).unwrap();
    tree.commit();
    disposal.await.unwrap();
    tree.settle().await.unwrap();

    assert!(parent.is_disposed());
    assert!(child.is_disposed());
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

/// A dependency dropped while its node is disposing does not spare the
/// dependent that was already marked.
#[tokio::test]
async fn dependent_unlinked_mid_disposal_still_finishes() {
    let tree = EffectTree::new();
    let source = Effect::new(&tree).unwrap();
    let watcher = Effect::new(&tree).unwrap();
    watcher.add_dependency(&source).unwrap();
    tree.commit();

    let teardowns = Arc::new(AtomicUsize::new(0));
    watcher.set_destroy(counting_teardown(&teardowns));

    let disposal = source.dispose();
    assert!(watcher.is_disposing());
    watcher.remove_dependency(&source).unwrap();
    tree.commit();
    disposal.await.unwrap();
    tree.settle().await.unwrap();

    assert!(watcher.is_disposed());
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

/// Dropping a disposal handle does not abort the cascade: settling the tree
/// or disposing again finishes it.
#[tokio::test]
async fn dropped_disposal_is_not_lost() {
    let tree = EffectTree::new();
    let settled = Effect::new(&tree).unwrap();
    let retried = Effect::new(&tree).unwrap();
    let child = Effect::new(&settled).unwrap();
    tree.commit();

    let teardowns = Arc::new(AtomicUsize::new(0));
    for effect in [&settled, &retried, &child] {
        effect.set_destroy(counting_teardown(&teardowns));
    }

    drop(settled.dispose());
    drop(retried.dispose());
    assert!(settled.is_disposing());
    assert!(child.is_disposing());

    retried.dispose().await.unwrap();
    assert!(retried.is_disposed());
    assert!(settled.is_disposing());

    tree.settle().await.unwrap();
    assert!(settled.is_disposed());
    assert!(child.is_disposed());
    assert_eq!(teardowns.load(Ordering::SeqCst), 3);
    assert_eq!(tree.node_count(), 1);
}

/// An effect whose parent is disposed before the attachment commits is
/// disposed instead of lingering without an owner.
#[tokio::test]
async fn effect_with_a_parent_disposed_before_commit() {
    let tree = EffectTree::new();
    let parent = Effect::new(&tree).unwrap();
    tree.commit();

    let teardowns = Arc::new(AtomicUsize::new(0));
    let child = Effect::new(&parent).unwrap();
    child.set_destroy(counting_teardown(&teardowns));
    parent.dispose().await.unwrap();
    assert!(child.is_alive());

    let summary = tree.commit();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.disposals, 1);

    tree.settle().await.unwrap();
    assert!(child.is_disposed());
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(tree.node_count(), 1);
}
