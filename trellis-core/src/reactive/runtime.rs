//! Node registry and the public entry points.
//!
//! Reactive nodes are interned by target identity: wrapping the same
//! container twice yields the same node, which is what makes subscription
//! edges, derived caches, and pending-event queues converge on one place
//! per object no matter how many paths lead to it.
//!
//! # How It Works
//!
//! 1. `reactive` looks the container up in a global identity map keyed by
//!    its address. A hit returns the existing node; a miss creates one and
//!    registers a weak entry before handing it out.
//!
//! 2. The map holds `Weak` references only, so it never keeps a node
//!    alive. A node lives exactly as long as values referencing it do;
//!    when the last one goes, `NodeInner`'s drop clears the dead entry.
//!
//! 3. `listen` attaches a callback to a node's listener set and returns a
//!    guard. Dropping the guard detaches the callback. Listening to a
//!    non-reactive value yields an inert guard, so callers can subscribe
//!    uniformly without type-guarding every call site.
//!
//! 4. `derived` builds a one-slot object whose `value` property is a
//!    getter running the supplied closure. Reads inside the closure
//!    register dependencies through the ordinary get path, so the slot
//!    invalidates and recomputes like any other getter.

use std::sync::{OnceLock, Weak};

use dashmap::DashMap;
use tracing::trace;

use crate::reactive::event::Event;
use crate::reactive::node::{NodeId, NodeInner, Reactive, Target};
use crate::value::{ObjectData, Value};

// Identity map from container address to its node. Weak entries so the
// registry never extends a node's lifetime.
static NODES: OnceLock<DashMap<usize, Weak<NodeInner>>> = OnceLock::new();

fn registry() -> &'static DashMap<usize, Weak<NodeInner>> {
    NODES.get_or_init(DashMap::new)
}

/// One node per target: return the existing wrapper for this container or
/// create and register a fresh one.
pub(crate) fn node_for(target: Target) -> Reactive {
    let key = target.key();
    if let Some(entry) = registry().get(&key) {
        if let Some(inner) = entry.upgrade() {
            return Reactive::from_inner(inner);
        }
    }
    let node = Reactive::from_target(target);
    registry().insert(key, node.downgrade());
    trace!(key, node = node.id().raw(), "node interned");
    node
}

/// Drop a node's registry entry. Called from `NodeInner`'s drop; the slot
/// may already hold a live replacement node for the same address, which
/// must stay.
pub(crate) fn release(key: usize, id: NodeId) {
    if let Some(nodes) = NODES.get() {
        nodes.remove_if(&key, |_, weak| weak.strong_count() == 0);
        trace!(key, node = id.raw(), "node released");
    }
}

/// Wrap a value for change tracking.
///
/// Containers and functions wrap into reactive nodes; wrapping the same
/// container twice, or wrapping an already reactive value, returns the
/// same node. Scalars pass through unchanged.
pub fn reactive(value: impl Into<Value>) -> Value {
    let value = value.into();
    match Target::from_value(&value) {
        Some(target) => Value::Node(node_for(target)),
        None => value,
    }
}

/// Whether a value is a reactive node.
pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Node(_))
}

/// The raw target behind a reactive node, or the input unchanged if it is
/// not reactive. Reads through the result are untracked; useful for
/// identity comparisons and for handing data to code that must not
/// register dependencies.
pub fn snapshot(value: &Value) -> Value {
    match value {
        Value::Node(node) => node.target_value(),
        other => other.clone(),
    }
}

/// Listener registration handle.
///
/// Dropping the guard removes the callback from the node's listener set.
/// Guards returned for non-reactive values are inert.
pub struct ListenerGuard {
    entry: Option<(Weak<NodeInner>, u64)>,
}

impl ListenerGuard {
    fn inert() -> ListenerGuard {
        ListenerGuard { entry: None }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some((weak, id)) = self.entry.take() {
            if let Some(inner) = weak.upgrade() {
                Reactive::from_inner(inner).remove_listener(id);
            }
        }
    }
}

/// Register a callback for batched change events on a reactive value.
///
/// Callbacks run during flush, after bubbling and collapse, so each one
/// observes a stable deduplicated view of the batch. Listening to a
/// non-reactive value is a no-op.
pub fn listen(value: &Value, callback: impl Fn(&Event) + Send + Sync + 'static) -> ListenerGuard {
    let Value::Node(node) = value else {
        return ListenerGuard::inert();
    };
    let id = node.add_listener(callback);
    ListenerGuard {
        entry: Some((node.downgrade(), id)),
    }
}

/// A lazily computed reactive value: an object with a single getter-backed
/// `value` property running `body`. Reads inside `body` are tracked, so
/// the slot recomputes when anything it touched changes.
pub fn derived(body: impl Fn() -> Value + Send + Sync + 'static) -> Value {
    let mut data = ObjectData::new();
    data.insert_getter("value", body);
    reactive(Value::object(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::scheduler::flush_sync;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn wrapping_is_idempotent() {
        let data = Value::empty_object();
        let a = reactive(data.clone());
        let b = reactive(data);
        assert!(a.same(&b));

        // Wrapping a node is the identity.
        let c = reactive(a.clone());
        assert!(a.same(&c));
    }

    #[test]
    fn scalars_pass_through() {
        let n = reactive(7);
        assert_eq!(n, Value::Int(7));
        assert!(!is_reactive(&n));
    }

    #[test]
    fn dead_nodes_leave_the_registry() {
        let data = Value::empty_object();
        let key = Target::from_value(&data).unwrap().key();

        let r = reactive(data);
        assert!(registry().contains_key(&key));

        drop(r);
        assert!(!registry().contains_key(&key));
    }

    #[test]
    fn snapshot_unwraps_to_the_raw_target() {
        let r = reactive(json!({"a": 1}));
        let raw = snapshot(&r);
        assert!(!is_reactive(&raw));
        // Same identity every time, not a copy.
        assert!(raw.same(&snapshot(&r)));

        assert_eq!(snapshot(&Value::Int(3)), Value::Int(3));
    }

    #[test]
    fn dropping_the_guard_removes_the_listener() {
        let r = reactive(json!({"count": 0}));
        let seen = Arc::new(AtomicI32::new(0));
        {
            let tally = seen.clone();
            let _guard = listen(&r, move |_| {
                tally.fetch_add(1, Ordering::SeqCst);
            });
            r.set("count", 1);
            flush_sync();
            assert_eq!(seen.load(Ordering::SeqCst), 1);
        }

        r.set("count", 2);
        flush_sync();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listening_to_a_plain_value_is_inert() {
        let guard = listen(&Value::Int(5), |_| {
            panic!("plain values never notify");
        });
        drop(guard);
    }

    #[test]
    fn derived_recomputes_after_a_tracked_write() {
        let src = reactive(json!({"n": 2}));
        let handle = src.clone();
        let d = derived(move || match handle.get("n") {
            Value::Int(n) => Value::Int(n * 10),
            other => other,
        });
        assert!(is_reactive(&d));
        assert_eq!(d.get("value"), Value::Int(20));

        // Invalidation happens during bubbling, no flush needed.
        src.set("n", 5);
        assert_eq!(d.get("value"), Value::Int(50));
    }
}
