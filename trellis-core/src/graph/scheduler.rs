//! Flush scheduler
//!
//! Mutations do not reach listeners directly: they are queued here and
//! delivered in one batch per microtask-style tick. The queue collapses as
//! it fills, so listeners observe net transitions instead of every
//! intermediate write.
//!
//! # Algorithm
//!
//! 1. `schedule` appends an event to the emitting node's queue entry.
//!    Mutations of the same path fold into one record, relabels compose
//!    into one, applies always append.
//! 2. The first event of a batch arms a deferred flush on the current
//!    thread's tokio runtime. Without a single-threaded runtime to defer
//!    to, the queue waits for an explicit `flush_sync`.
//! 3. `flush_sync` swaps the queue out, orders entries so transitive
//!    ancestors (in subscription terms) deliver before their descendants,
//!    resolves each event's values against current state, and notifies.
//!    The swap means listener callbacks that mutate state feed a fresh
//!    queue, drained by the same loop before the flush returns.
//!
//! The scheduler is thread-local. The engine's cooperative model confines
//! tracked state to one thread, and keeping the queue off shared globals
//! means concurrent test threads cannot contaminate each other's batches.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::mem;

use indexmap::IndexMap;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, trace};

use crate::graph::relabel;
use crate::reactive::event::{MutKind, NetKind, PendingEvent};
use crate::reactive::node::{NodeId, Reactive};
use crate::reactive::path::Path;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    /// Nothing queued, or queued events awaiting an explicit flush.
    Idle,
    /// A deferred flush task has been spawned for the current batch.
    Armed,
    /// A flush is draining the queue on this thread.
    Flushing,
}

/// Queued events for one node, with the indexes that drive collapsing.
struct NodeQueue {
    node: Reactive,
    events: Vec<PendingEvent>,
    /// Position in `events` of the collapsed mutation record per path.
    mut_index: HashMap<Path, usize>,
    /// Position in `events` of the composed relabel, if any.
    relabel_at: Option<usize>,
}

impl NodeQueue {
    fn new(node: Reactive) -> Self {
        NodeQueue {
            node,
            events: Vec::new(),
            mut_index: HashMap::new(),
            relabel_at: None,
        }
    }
}

struct SchedulerState {
    queue: IndexMap<NodeId, NodeQueue>,
    phase: Phase,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState {
        queue: IndexMap::new(),
        phase: Phase::Idle,
    });
}

/// Queue one event for `node`, collapsing into the current batch.
pub(crate) fn schedule(node: Reactive, ev: PendingEvent) {
    let should_arm = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        let first_of_batch = s.queue.is_empty() && s.phase == Phase::Idle;

        let entry = s
            .queue
            .entry(node.id())
            .or_insert_with(|| NodeQueue::new(node));
        match ev {
            PendingEvent::Mutation(m) => {
                if let Some(&at) = entry.mut_index.get(&m.path) {
                    let kind = match m.net {
                        NetKind::Create => MutKind::Create,
                        NetKind::Update => MutKind::Update,
                        NetKind::Delete => MutKind::Delete,
                        NetKind::Annihilated => {
                            unreachable!("freshly emitted mutations are never annihilated")
                        }
                    };
                    if let PendingEvent::Mutation(existing) = &mut entry.events[at] {
                        existing.absorb(kind, m.old);
                    }
                } else {
                    entry.mut_index.insert(m.path.clone(), entry.events.len());
                    entry.events.push(PendingEvent::Mutation(m));
                }
            }
            PendingEvent::Relabel { labels } => match entry.relabel_at {
                Some(at) => {
                    if let PendingEvent::Relabel { labels: existing } = &mut entry.events[at] {
                        *existing = relabel::compose_labels(existing, &labels);
                    }
                }
                None => {
                    entry.relabel_at = Some(entry.events.len());
                    entry.events.push(PendingEvent::Relabel { labels });
                }
            },
            // Applies replay in call order and never collapse.
            apply @ PendingEvent::Apply { .. } => entry.events.push(apply),
        }

        first_of_batch
    });

    if should_arm {
        let armed = arm();
        if armed {
            SCHEDULER.with(|s| s.borrow_mut().phase = Phase::Armed);
        }
    }
}

/// Spawn the deferred flush for this batch. Only a current-thread runtime
/// can host it: the queue is thread-local, so the task must run on the
/// scheduling thread.
fn arm() -> bool {
    if let Ok(handle) = Handle::try_current() {
        if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
            handle.spawn(async {
                flush_sync();
            });
            return true;
        }
    }
    false
}

/// Drain the queue now, delivering every resolvable event to its node's
/// listeners. Reentrant calls (from a listener callback) return
/// immediately; the outer flush picks up whatever they scheduled.
pub fn flush_sync() {
    let proceed = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        if s.phase == Phase::Flushing {
            return false;
        }
        s.phase = Phase::Flushing;
        true
    });
    if !proceed {
        return;
    }

    loop {
        let batch = SCHEDULER.with(|s| mem::take(&mut s.borrow_mut().queue));
        if batch.is_empty() {
            break;
        }
        debug!(nodes = batch.len(), "flushing batch");

        for id in topological_order(&batch) {
            let Some(entry) = batch.get(&id) else { continue };
            // Resolution reads fresh values; not worth it for nodes
            // nobody is listening to.
            if !entry.node.has_listeners() {
                continue;
            }
            for ev in &entry.events {
                if let Some(event) = entry.node.resolve_pending(ev) {
                    trace!(node = id.raw(), kind = event.kind_str(), "deliver");
                    entry.node.notify(&event);
                }
            }
        }
    }

    SCHEDULER.with(|s| s.borrow_mut().phase = Phase::Idle);
}

/// Resolve until nothing is pending. Yields first so an armed deferred
/// flush can run; if no deferred flush is coming, drains synchronously.
pub async fn flushed() {
    while SCHEDULER.with(|s| {
        let s = s.borrow();
        s.phase == Phase::Armed || s.phase == Phase::Flushing
    }) {
        tokio::task::yield_now().await;
    }
    if SCHEDULER.with(|s| !s.borrow().queue.is_empty()) {
        flush_sync();
    }
}

/// Order pending nodes so every transitive ancestor precedes its
/// descendants. Ties and ancestry cycles fall back to insertion order,
/// which is emission order.
fn topological_order(batch: &IndexMap<NodeId, NodeQueue>) -> Vec<NodeId> {
    let ids: Vec<NodeId> = batch.keys().copied().collect();
    if ids.len() <= 1 {
        return ids;
    }

    let mut in_degree: HashMap<NodeId, usize> = ids.iter().map(|&id| (id, 0)).collect();
    let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &a in &ids {
        for &b in &ids {
            if a == b {
                continue;
            }
            // A strict ancestor comes first. Mutual reachability yields no
            // edge at all, so cycles cannot wedge the sort.
            if batch[&b].node.has_subscriber(a) && !batch[&a].node.has_subscriber(b) {
                successors.entry(a).or_default().push(b);
                *in_degree.get_mut(&b).expect("pending id") += 1;
            }
        }
    }

    let mut queue: VecDeque<NodeId> = ids
        .iter()
        .copied()
        .filter(|id| in_degree[id] == 0)
        .collect();
    let mut order = Vec::with_capacity(ids.len());

    while let Some(id) = queue.pop_front() {
        order.push(id);
        if let Some(next) = successors.get(&id) {
            for &b in next {
                let degree = in_degree.get_mut(&b).expect("pending id");
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(b);
                }
            }
        }
    }

    if order.len() < ids.len() {
        let seen: HashSet<NodeId> = order.iter().copied().collect();
        order.extend(ids.iter().copied().filter(|id| !seen.contains(id)));
    }
    order
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::reactive::event::Event;
    use crate::reactive::runtime::{listen, reactive};
    use crate::value::Value;

    #[test]
    fn consecutive_writes_collapse_to_one_update() {
        let r = reactive(Value::from(serde_json::json!({"a": 1})));
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();
        let _guard = listen(&r, move |ev| {
            seen.lock().unwrap().push(ev.clone());
        });

        r.set("a", 2);
        r.set("a", 3);
        flush_sync();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Update {
                path,
                new_value,
                old_value,
            } => {
                assert_eq!(path.as_str(), ".a");
                assert_eq!(*new_value, Value::Int(3));
                // The old value spans the whole batch.
                assert_eq!(*old_value, Some(Value::Int(1)));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn create_then_delete_annihilates() {
        let r = reactive(Value::from(serde_json::json!({})));
        let count = Arc::new(AtomicI32::new(0));
        let seen = count.clone();
        let _guard = listen(&r, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        r.set("tmp", 1);
        r.delete("tmp");
        flush_sync();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn settled_back_updates_are_skipped() {
        let r = reactive(Value::from(serde_json::json!({"a": 1})));
        let count = Arc::new(AtomicI32::new(0));
        let seen = count.clone();
        let _guard = listen(&r, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        r.set("a", 2);
        r.set("a", 1);
        flush_sync();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn settled_back_creates_still_deliver() {
        let r = reactive(Value::from(serde_json::json!({})));
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();
        let _guard = listen(&r, move |ev| {
            seen.lock().unwrap().push(ev.clone());
        });

        // A fresh key cycling back to its first value is still a key the
        // listener has never seen.
        r.set("a", 1);
        r.set("a", 2);
        r.set("a", 1);
        flush_sync();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Create {
                path,
                new_value,
                old_value,
            } => {
                assert_eq!(path.as_str(), ".a");
                assert_eq!(*new_value, Value::Int(1));
                assert!(old_value.is_none());
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn ancestors_deliver_before_descendants() {
        let r = reactive(Value::from(serde_json::json!({"child": {"x": 1}})));
        let child = r.get("child");

        let order = Arc::new(Mutex::new(Vec::new()));
        let outer = order.clone();
        let _g1 = listen(&r, move |_| {
            outer.lock().unwrap().push("parent");
        });
        let inner = order.clone();
        let _g2 = listen(&child, move |_| {
            inner.lock().unwrap().push("child");
        });

        child.set("x", 2);
        flush_sync();

        assert_eq!(*order.lock().unwrap(), vec!["parent", "child"]);
    }

    #[test]
    fn listener_mutations_flush_in_the_same_drain() {
        let r = reactive(Value::from(serde_json::json!({"a": 0, "echo": 0})));
        let events = Arc::new(Mutex::new(Vec::new()));

        let seen = events.clone();
        let inner = r.clone();
        let _guard = listen(&r, move |ev| {
            seen.lock().unwrap().push(ev.clone());
            if let Event::Update { path, .. } = ev {
                if path.as_str() == ".a" {
                    inner.set("echo", 1);
                }
            }
        });

        r.set("a", 1);
        flush_sync();

        let events = events.lock().unwrap();
        let paths: Vec<String> = events
            .iter()
            .filter_map(|e| e.path().map(|p| p.as_str().to_string()))
            .collect();
        assert_eq!(paths, vec![".a".to_string(), ".echo".to_string()]);
    }

    #[test]
    fn apply_events_never_collapse() {
        let calls = reactive(Value::from(serde_json::json!({})));
        let f = Value::function(|_| Value::Null);
        calls.set("go", f);

        let count = Arc::new(AtomicI32::new(0));
        let seen = count.clone();
        let _guard = listen(&calls, move |ev| {
            if matches!(ev, Event::Apply { .. }) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        flush_sync(); // clear the create event

        let go = calls.get("go");
        go.call(&[]).unwrap();
        go.call(&[]).unwrap();
        flush_sync();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
