//! Reactive node core
//!
//! A [`Reactive`] node pairs one shared container (its target) with the
//! bookkeeping that makes it observable: a subscription graph, a cache of
//! wrapped children, a cache of evaluated getter slots, and the node's own
//! listener list.
//!
//! # How nodes work
//!
//! 1. Reading a slot returns the stored value, with container values
//!    wrapped in their own node. Wrapping subscribes the parent to the
//!    child, so the subscription graph mirrors the reachable object graph
//!    as it is actually traversed.
//!
//! 2. Mutating a slot emits a pending event: it is queued on this node,
//!    then bubbled synchronously up every subscriber edge with its path
//!    rewritten under the edge's root. Graph shape (edges, caches, labels)
//!    is therefore consistent the moment a mutation returns.
//!
//! 3. Listener delivery is deferred: the scheduler collapses the queue and
//!    resolves event values lazily at flush time, so listeners observe one
//!    batched, deduplicated view per flush.
//!
//! # Thread model
//!
//! The engine runs on one thread. The locks here are not a concurrency
//! story; they give shared handles interior mutability, and every lock is
//! released before user code or another node's lock can be reached.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::trace;

use crate::error::Error;
use crate::graph::scheduler;
use crate::graph::subscriptions::{DepKey, SubscriptionGraph};
use crate::reactive::context::{self, EvalFrame};
use crate::reactive::event::{Event, LabelPairs, MutKind, NetKind, PendingEvent, PendingMutation};
use crate::reactive::path::Path;
use crate::reactive::runtime;
use crate::value::{ArrayRef, FuncRef, GetterFn, MapRef, ObjectRef, Value};

/// Stable identifier of a reactive node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn raw(&self) -> u64 {
        self.0
    }
}

/// The wrapped container. Holding the `Arc` keeps the target alive for as
/// long as its node lives; targets never point back at their node.
#[derive(Clone)]
pub(crate) enum Target {
    Object(ObjectRef),
    Array(ArrayRef),
    Map(MapRef),
    Func(FuncRef),
}

impl Target {
    pub fn from_value(value: &Value) -> Option<Target> {
        match value {
            Value::Object(o) => Some(Target::Object(o.clone())),
            Value::Array(a) => Some(Target::Array(a.clone())),
            Value::Map(m) => Some(Target::Map(m.clone())),
            Value::Func(f) => Some(Target::Func(f.clone())),
            Value::Node(n) => Some(n.target().clone()),
            _ => None,
        }
    }

    /// Identity key: the target's allocation address. Also the key of the
    /// global identity cache, so one container maps to one node.
    pub fn key(&self) -> usize {
        match self {
            Target::Object(o) => Arc::as_ptr(o) as usize,
            Target::Array(a) => Arc::as_ptr(a) as usize,
            Target::Map(m) => Arc::as_ptr(m) as usize,
            Target::Func(f) => Arc::as_ptr(f) as *const () as usize,
        }
    }

    pub fn as_value(&self) -> Value {
        match self {
            Target::Object(o) => Value::Object(o.clone()),
            Target::Array(a) => Value::Array(a.clone()),
            Target::Map(m) => Value::Map(m.clone()),
            Target::Func(f) => Value::Func(f.clone()),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Target::Object(_) => "object",
            Target::Array(_) => "array",
            Target::Map(_) => "map",
            Target::Func(_) => "function",
        }
    }
}

pub(crate) type ListenerFn = Arc<dyn Fn(&Event) + Send + Sync>;

/// Shared node state. One per wrapped container, joined to the container
/// through the global identity cache.
pub(crate) struct NodeInner {
    pub id: NodeId,
    pub target: Target,
    /// Who hears this node's events, and through which edges.
    pub subs: RwLock<SubscriptionGraph>,
    /// Last-observed value per getter slot. An entry exists only while the
    /// slot is clean; invalidation removes it.
    pub derived_cache: RwLock<HashMap<Path, Value>>,
    /// Per getter slot, the nodes holding a tracked edge for it. Consulted
    /// to detach stale edges before re-evaluation.
    pub derived_sources: RwLock<HashMap<Path, Vec<(NodeId, Weak<NodeInner>)>>>,
    /// Child nodes by the path they were wrapped at.
    pub wrapped: RwLock<HashMap<Path, Reactive>>,
    pub listeners: RwLock<Vec<(u64, ListenerFn)>>,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        runtime::release(self.target.key(), self.id);
    }
}

/// A handle to a reactive node. Cloning the handle shares the node.
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<NodeInner>,
}

impl Reactive {
    pub(crate) fn from_target(target: Target) -> Reactive {
        Reactive {
            inner: Arc::new(NodeInner {
                id: NodeId::new(),
                target,
                subs: RwLock::new(SubscriptionGraph::new()),
                derived_cache: RwLock::new(HashMap::new()),
                derived_sources: RwLock::new(HashMap::new()),
                wrapped: RwLock::new(HashMap::new()),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<NodeInner>) -> Reactive {
        Reactive { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<NodeInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn id(&self) -> NodeId {
        self.inner.id
    }

    pub(crate) fn target(&self) -> &Target {
        &self.inner.target
    }

    pub(crate) fn target_key(&self) -> usize {
        self.inner.target.key()
    }

    /// The plain container behind this node.
    pub(crate) fn target_value(&self) -> Value {
        self.inner.target.as_value()
    }

    pub(crate) fn target_kind_name(&self) -> &'static str {
        self.inner.target.kind_name()
    }

    /// Whether `value` is this node's own target (or a handle to it).
    pub(crate) fn same_target(&self, value: &Value) -> bool {
        Target::from_value(value).is_some_and(|t| t.key() == self.target_key())
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reactive(#{} {})", self.id().raw(), self.target_kind_name())
    }
}

// ----------------------------------------------------------------------------
// Trap surface: get / set / delete / call
// ----------------------------------------------------------------------------

impl Reactive {
    /// Read one slot. Reads register dependencies when a getter evaluation
    /// is in progress, and wrap container values in their own node.
    pub(crate) fn get(&self, key: &str) -> Value {
        let path = Path::root().key(key);
        match &self.inner.target {
            Target::Object(o) => {
                let prop = {
                    let guard = o.read().expect("object lock poisoned");
                    guard.get(key).cloned()
                };
                match prop {
                    // Frozen slots pass through raw and untracked: their
                    // value can never change, so there is nothing to hear.
                    Some(p) if p.is_frozen() => p.value,
                    Some(p) => match p.value {
                        Value::Getter(body) => {
                            self.track_read(&[DepKey::Path(path.clone())]);
                            self.read_derived(&path, &body)
                        }
                        value => {
                            self.track_read(&[DepKey::Path(path.clone())]);
                            self.wrap_child(&path, value)
                        }
                    },
                    None => {
                        self.track_read(&[DepKey::Path(path)]);
                        Value::Null
                    }
                }
            }
            Target::Map(m) => {
                self.track_read(&[DepKey::Path(path.clone())]);
                let stored = {
                    let guard = m.read().expect("map lock poisoned");
                    guard.get(key).cloned()
                };
                match stored {
                    Some(v) => self.wrap_child(&path, v),
                    None => Value::Null,
                }
            }
            Target::Array(a) => {
                if key == "length" {
                    self.track_read(&[DepKey::Path(path), DepKey::Structure]);
                    Value::Int(a.read().expect("array lock poisoned").len() as i64)
                } else if let Ok(i) = key.parse::<usize>() {
                    self.get_index(i)
                } else {
                    Value::Null
                }
            }
            Target::Func(_) => Value::Null,
        }
    }

    /// Write one slot. Returns `false` when the write is refused: getter
    /// slots have no setter, read-only slots only accept their current
    /// value. Writing a value that is `same` as the stored one succeeds
    /// without emitting.
    pub(crate) fn set(&self, key: &str, value: Value) -> bool {
        match &self.inner.target {
            Target::Object(o) => {
                let path = Path::root().key(key);
                let existing = {
                    let guard = o.read().expect("object lock poisoned");
                    guard.get(key).cloned()
                };
                match existing {
                    Some(p) => {
                        if matches!(p.value, Value::Getter(_)) {
                            return false;
                        }
                        if !p.writable {
                            return p.value.same(&value);
                        }
                        if p.value.same(&value) {
                            return true;
                        }
                        let old = self.capture_old(&path, &p.value);
                        self.prune_child(&path);
                        {
                            let mut guard = o.write().expect("object lock poisoned");
                            if let Some(slot) = guard.get_mut(key) {
                                slot.value = value.clone();
                            }
                        }
                        self.adopt(&path, &value);
                        self.emit_mutation(path, MutKind::Update, Some(old));
                        true
                    }
                    None => {
                        {
                            let mut guard = o.write().expect("object lock poisoned");
                            guard.insert(key, value.clone());
                        }
                        self.adopt(&path, &value);
                        self.emit_mutation(path, MutKind::Create, None);
                        self.invalidate_structural();
                        true
                    }
                }
            }
            Target::Map(_) => self.map_set(key, value),
            Target::Array(_) => {
                if key == "length" {
                    match value.as_int() {
                        Some(n) if n >= 0 => self.set_len(n as usize),
                        _ => false,
                    }
                } else if let Ok(i) = key.parse::<usize>() {
                    self.set_index(i, value)
                } else {
                    false
                }
            }
            Target::Func(_) => false,
        }
    }

    /// Remove one slot. Deleting a missing key succeeds silently; deleting
    /// a non-configurable slot is refused. The slot's getter cache entry is
    /// purged either way once past the configurability check.
    pub(crate) fn delete(&self, key: &str) -> bool {
        match &self.inner.target {
            Target::Object(o) => {
                let path = Path::root().key(key);
                let existing = {
                    let guard = o.read().expect("object lock poisoned");
                    guard.get(key).cloned()
                };
                let Some(p) = existing else {
                    self.inner
                        .derived_cache
                        .write()
                        .expect("derived cache lock poisoned")
                        .remove(&path);
                    return true;
                };
                if !p.configurable {
                    return false;
                }

                let cached = self
                    .inner
                    .derived_cache
                    .write()
                    .expect("derived cache lock poisoned")
                    .remove(&path);
                let old = if matches!(p.value, Value::Getter(_)) {
                    cached.unwrap_or(Value::Null)
                } else {
                    self.capture_old(&path, &p.value)
                };

                self.prune_child(&path);
                self.detach_sources(&path);
                {
                    let mut guard = o.write().expect("object lock poisoned");
                    guard.remove(key);
                }
                self.emit_mutation(path, MutKind::Delete, Some(old));
                self.invalidate_structural();
                true
            }
            Target::Map(_) => self.map_delete(key),
            Target::Array(_) | Target::Func(_) => false,
        }
    }

    pub(crate) fn has(&self, key: &str) -> bool {
        match &self.inner.target {
            Target::Object(o) => {
                self.track_read(&[DepKey::Path(Path::root().key(key))]);
                o.read().expect("object lock poisoned").contains_key(key)
            }
            Target::Map(m) => {
                self.track_read(&[DepKey::Path(Path::root().key(key))]);
                m.read().expect("map lock poisoned").contains_key(key)
            }
            Target::Array(a) => {
                self.track_read(&[DepKey::Structure]);
                key.parse::<usize>()
                    .map(|i| i < a.read().expect("array lock poisoned").len())
                    .unwrap_or(key == "length")
            }
            Target::Func(_) => false,
        }
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.track_read(&[DepKey::Structure]);
        match &self.inner.target {
            Target::Object(o) => o.read().expect("object lock poisoned").keys(),
            Target::Map(m) => m
                .read()
                .expect("map lock poisoned")
                .keys()
                .cloned()
                .collect(),
            Target::Array(_) | Target::Func(_) => Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.track_read(&[DepKey::Structure]);
        match &self.inner.target {
            Target::Object(o) => o.read().expect("object lock poisoned").len(),
            Target::Array(a) => a.read().expect("array lock poisoned").len(),
            Target::Map(m) => m.read().expect("map lock poisoned").len(),
            Target::Func(_) => 0,
        }
    }

    /// Invoke a function target. The call emits an apply event that is
    /// observable by ancestors (under the function's path); the root-level
    /// apply itself is skipped at flush.
    pub(crate) fn call(&self, args: &[Value]) -> Result<Value, Error> {
        match &self.inner.target {
            Target::Func(f) => {
                let f = f.clone();
                self.emit(PendingEvent::Apply {
                    path: Path::root(),
                    args: args.to_vec(),
                });
                Ok(f(args))
            }
            other => Err(Error::NotCallable(other.kind_name())),
        }
    }
}

// ----------------------------------------------------------------------------
// Dependency tracking and getter slots
// ----------------------------------------------------------------------------

impl Reactive {
    /// Register `deps` on this node for the getter evaluation in progress,
    /// if any. Outside an evaluation this is a no-op, which is what makes
    /// plain reads (including flush-time value resolution) free.
    pub(crate) fn track_read(&self, deps: &[DepKey]) {
        let frame = context::with_current(Clone::clone);
        let Some(frame) = frame else { return };

        // A getter reading its own node still tracks: its deps live on the
        // same subscription graph as everyone else's.
        let new_edge = self
            .inner
            .subs
            .write()
            .expect("subscription lock poisoned")
            .insert(
                frame.owner.id(),
                frame.owner.downgrade(),
                frame.path.clone(),
                true,
                deps,
            );
        if new_edge {
            trace!(
                source = self.id().raw(),
                owner = frame.owner.id().raw(),
                slot = %frame.path,
                "tracked edge"
            );
        }
        frame.owner.record_source(&frame.path, self);
    }

    /// Remember that `source` carries a tracked edge for `slot`, so the
    /// edge can be detached before the slot is re-evaluated.
    fn record_source(&self, slot: &Path, source: &Reactive) {
        let mut sources = self
            .inner
            .derived_sources
            .write()
            .expect("derived sources lock poisoned");
        let entry = sources.entry(slot.clone()).or_default();
        if !entry.iter().any(|(id, _)| *id == source.id()) {
            entry.push((source.id(), source.downgrade()));
        }
    }

    /// Drop every tracked edge feeding `slot`.
    fn detach_sources(&self, slot: &Path) {
        let sources = self
            .inner
            .derived_sources
            .write()
            .expect("derived sources lock poisoned")
            .remove(slot)
            .unwrap_or_default();
        for (_, weak) in sources {
            if let Some(src) = weak.upgrade() {
                src.subs
                    .write()
                    .expect("subscription lock poisoned")
                    .remove_edges(self.id(), slot, true);
            }
        }
    }

    /// Cached value of a getter slot, evaluating on miss.
    fn read_derived(&self, slot: &Path, body: &GetterFn) -> Value {
        let cached = self
            .inner
            .derived_cache
            .read()
            .expect("derived cache lock poisoned")
            .get(slot)
            .cloned();
        if let Some(v) = cached {
            return v;
        }
        self.evaluate_derived(slot, body)
    }

    /// Run a getter body under a fresh evaluation frame and cache the
    /// result. Stale source edges are detached first so the dependency set
    /// always reflects the latest run.
    fn evaluate_derived(&self, slot: &Path, body: &GetterFn) -> Value {
        self.detach_sources(slot);
        let value = {
            let _frame = EvalFrame::enter(self.clone(), slot.clone());
            body()
        };
        self.inner
            .derived_cache
            .write()
            .expect("derived cache lock poisoned")
            .insert(slot.clone(), value.clone());
        value
    }

    /// Drop the cached value of a getter slot and announce the change. A
    /// slot that was never observed (no cache entry) stays silent, which
    /// also caps invalidation cascades at one emission per slot per batch.
    pub(crate) fn invalidate_derived(&self, slot: &Path) {
        let old = self
            .inner
            .derived_cache
            .write()
            .expect("derived cache lock poisoned")
            .remove(slot);
        if let Some(old) = old {
            trace!(node = self.id().raw(), slot = %slot, "getter invalidated");
            self.emit_mutation(slot.clone(), MutKind::Update, Some(old));
        }
    }

    /// Invalidate every subscriber whose getter read this node's shape.
    /// Called by mutations that change the key set, length, or order.
    pub(crate) fn invalidate_structural(&self) {
        let snap = self
            .inner
            .subs
            .write()
            .expect("subscription lock poisoned")
            .snapshot();
        for (_, sub, edges) in snap {
            for edge in &edges {
                if edge.derived && edge.depends_on_structure() {
                    sub.invalidate_derived(&edge.root);
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Child wrapping and pruning
// ----------------------------------------------------------------------------

impl Reactive {
    /// Wrap a read container value in its node, remember it as a wrapped
    /// child, and subscribe this node to it. Scalars pass through.
    pub(crate) fn wrap_child(&self, path: &Path, stored: Value) -> Value {
        let Some(target) = Target::from_value(&stored) else {
            return stored;
        };

        let cached = {
            let guard = self.inner.wrapped.read().expect("wrapped lock poisoned");
            guard.get(path).cloned()
        };
        let node = match cached {
            Some(n) if n.target_key() == target.key() => n,
            _ => runtime::node_for(target),
        };

        self.inner
            .wrapped
            .write()
            .expect("wrapped lock poisoned")
            .insert(path.clone(), node.clone());
        node.add_subscriber_edge(self, path);
        Value::Node(node)
    }

    /// Establish child bookkeeping for a freshly stored value, if it is a
    /// container. This is what makes adoption work: storing a shared value
    /// subscribes the new parent immediately, without waiting for a read.
    pub(crate) fn adopt(&self, path: &Path, stored: &Value) {
        if Target::from_value(stored).is_some() {
            self.wrap_child(path, stored.clone());
        }
    }

    /// Forget the wrapped child at `path` and remove its edge back to this
    /// node. No-op if the slot was never wrapped.
    pub(crate) fn prune_child(&self, path: &Path) {
        let child = self
            .inner
            .wrapped
            .write()
            .expect("wrapped lock poisoned")
            .remove(path);
        if let Some(child) = child {
            child
                .inner
                .subs
                .write()
                .expect("subscription lock poisoned")
                .remove_edges(self.id(), path, false);
            trace!(parent = self.id().raw(), path = %path, "child pruned");
        }
    }

    /// The stored value at `path`, as a listener should see it: the wrapped
    /// node when one exists, the raw value otherwise.
    pub(crate) fn capture_old(&self, path: &Path, raw: &Value) -> Value {
        let cached = {
            let guard = self.inner.wrapped.read().expect("wrapped lock poisoned");
            guard.get(path).cloned()
        };
        match cached {
            Some(n) => Value::Node(n),
            None => raw.clone(),
        }
    }

    fn add_subscriber_edge(&self, subscriber: &Reactive, root: &Path) {
        let new_edge = self
            .inner
            .subs
            .write()
            .expect("subscription lock poisoned")
            .insert(
                subscriber.id(),
                subscriber.downgrade(),
                root.clone(),
                false,
                &[],
            );
        if new_edge {
            trace!(
                child = self.id().raw(),
                parent = subscriber.id().raw(),
                root = %root,
                "subscribed"
            );
        }
    }

    /// Rewrite the plain edge toward `subscriber` from `old` to `new`.
    /// Panics if the edge does not exist; a wrapped child always carries
    /// one, so a miss is an engine bug.
    pub(crate) fn update_subscriber(&self, subscriber: NodeId, old: &Path, new: Path) {
        self.inner
            .subs
            .write()
            .expect("subscription lock poisoned")
            .update_root(subscriber, old, new);
    }
}

// ----------------------------------------------------------------------------
// Emission and bubbling
// ----------------------------------------------------------------------------

impl Reactive {
    pub(crate) fn emit_mutation(&self, path: Path, kind: MutKind, old: Option<Value>) {
        self.emit(PendingEvent::Mutation(PendingMutation::new(path, kind, old)));
    }

    /// Queue an event on this node and bubble it up the subscriber graph.
    pub(crate) fn emit(&self, ev: PendingEvent) {
        scheduler::schedule(self.clone(), ev.clone());
        self.bubble(ev);
    }

    /// Propagate one event up every plain subscriber edge, rewriting its
    /// paths under each edge's root, and invalidate getter edges whose
    /// tracked reads the event hits. Iterative so arbitrarily deep graphs
    /// cannot overflow the stack.
    fn bubble(&self, ev: PendingEvent) {
        let mut work: Vec<(Reactive, PendingEvent)> = vec![(self.clone(), ev)];
        while let Some((node, ev)) = work.pop() {
            let snap = node
                .inner
                .subs
                .write()
                .expect("subscription lock poisoned")
                .snapshot();
            for (_, sub, edges) in snap {
                for edge in &edges {
                    if edge.derived {
                        if let PendingEvent::Mutation(m) = &ev {
                            if edge.hit_by(&m.path) {
                                sub.invalidate_derived(&edge.root);
                            }
                        }
                        continue;
                    }
                    // A subscriber this node itself subscribes to is a
                    // mutual ancestor; forwarding to it would bounce the
                    // event back and double-count. Self edges fall out of
                    // the same check.
                    if sub.has_subscriber(node.id()) {
                        continue;
                    }
                    let rewritten = ev.with_prefix(&edge.root);
                    scheduler::schedule(sub.clone(), rewritten.clone());
                    work.push((sub.clone(), rewritten));
                }
            }
        }
    }

    /// Whether `needle` is this node or a transitive subscriber (ancestor)
    /// of it.
    pub(crate) fn has_subscriber(&self, needle: NodeId) -> bool {
        if self.id() == needle {
            return true;
        }
        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(self.id());
        let mut queue: VecDeque<Reactive> = VecDeque::new();
        queue.push_back(self.clone());

        while let Some(node) = queue.pop_front() {
            let snap = node
                .inner
                .subs
                .write()
                .expect("subscription lock poisoned")
                .snapshot();
            for (id, sub, _) in snap {
                if id == needle {
                    return true;
                }
                if visited.insert(id) {
                    queue.push_back(sub);
                }
            }
        }
        false
    }
}

// ----------------------------------------------------------------------------
// Relabeling
// ----------------------------------------------------------------------------

impl Reactive {
    /// Move wrapped-child bookkeeping and plain subscription edges to the
    /// elements' new positions, then emit the relabel event. Two-phase so
    /// swaps do not collide, and synchronous so the graph is consistent
    /// before the mutation returns.
    pub(crate) fn apply_relabel(&self, pairs: &LabelPairs) {
        if pairs.is_empty() {
            return;
        }

        let mut moved: Vec<(Path, Path, Reactive)> = Vec::new();
        {
            let mut wrapped = self.inner.wrapped.write().expect("wrapped lock poisoned");
            for (from, to) in pairs {
                if let Some(child) = wrapped.remove(from) {
                    moved.push((from.clone(), to.clone(), child));
                }
            }
            for (_, to, child) in &moved {
                wrapped.insert(to.clone(), child.clone());
            }
        }
        for (from, to, child) in &moved {
            child.update_subscriber(self.id(), from, to.clone());
        }
        trace!(node = self.id().raw(), pairs = pairs.len(), "relabeled");

        self.emit(PendingEvent::Relabel {
            labels: pairs.clone(),
        });
    }
}

// ----------------------------------------------------------------------------
// Flush-time resolution
// ----------------------------------------------------------------------------

impl Reactive {
    /// Untracked existence check for one slot.
    fn has_raw(&self, key: &str) -> bool {
        match &self.inner.target {
            Target::Object(o) => o.read().expect("object lock poisoned").contains_key(key),
            Target::Map(m) => m.read().expect("map lock poisoned").contains_key(key),
            Target::Array(a) => {
                key == "length"
                    || key
                        .parse::<usize>()
                        .map(|i| i < a.read().expect("array lock poisoned").len())
                        .unwrap_or(false)
            }
            Target::Func(_) => false,
        }
    }

    /// Walk a multi-segment path from this node. Returns `None` when a
    /// segment is missing. Reads go through the normal slot reads, outside
    /// any evaluation frame, so nothing is tracked.
    pub(crate) fn read_path(&self, path: &Path) -> Option<Value> {
        let mut current = Value::Node(self.clone());
        for seg in path.segments() {
            current = match current {
                Value::Node(n) => {
                    if !n.has_raw(&seg) {
                        return None;
                    }
                    n.get(&seg)
                }
                other => {
                    if !other.has(&seg) {
                        return None;
                    }
                    other.get(&seg)
                }
            };
        }
        Some(current)
    }

    /// Resolve a queued event into its delivered form, reading values from
    /// the state at flush time. Returns `None` when delivery is skipped: an
    /// annihilated create/delete pair, an update whose value settled back,
    /// a root-path apply, or an empty relabel.
    pub(crate) fn resolve_pending(&self, ev: &PendingEvent) -> Option<Event> {
        match ev {
            PendingEvent::Mutation(m) => match m.net {
                NetKind::Annihilated => None,
                NetKind::Create => {
                    let new_value = self.read_path(&m.path)?;
                    // A create can carry an old value (length growth); it
                    // settles back the same way an update does.
                    if let Some(old) = &m.old {
                        if old.same(&new_value) {
                            return None;
                        }
                    }
                    Some(Event::Create {
                        path: m.path.clone(),
                        new_value,
                        old_value: m.old.clone(),
                    })
                }
                NetKind::Update => {
                    let new_value = self.read_path(&m.path).unwrap_or(Value::Null);
                    if let Some(old) = &m.old {
                        if old.same(&new_value) {
                            return None;
                        }
                    }
                    Some(Event::Update {
                        path: m.path.clone(),
                        new_value,
                        old_value: m.old.clone(),
                    })
                }
                NetKind::Delete => Some(Event::Delete {
                    path: m.path.clone(),
                    old_value: m.old.clone().unwrap_or(Value::Null),
                }),
            },
            PendingEvent::Apply { path, args } => {
                if path.is_root() {
                    return None;
                }
                Some(Event::Apply {
                    path: path.clone(),
                    args: args.clone(),
                })
            }
            PendingEvent::Relabel { labels } => {
                if labels.is_empty() {
                    return None;
                }
                Some(Event::Relabel {
                    labels: labels.to_vec(),
                })
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Listeners
// ----------------------------------------------------------------------------

impl Reactive {
    pub(crate) fn add_listener(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> u64 {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .expect("listener lock poisoned")
            .push((id, Arc::new(f)));
        id
    }

    pub(crate) fn remove_listener(&self, id: u64) {
        self.inner
            .listeners
            .write()
            .expect("listener lock poisoned")
            .retain(|(lid, _)| *lid != id);
    }

    pub(crate) fn has_listeners(&self) -> bool {
        !self
            .inner
            .listeners
            .read()
            .expect("listener lock poisoned")
            .is_empty()
    }

    /// Invoke this node's listeners. The list is snapshotted first so a
    /// callback may add or remove listeners without corrupting iteration.
    pub(crate) fn notify(&self, ev: &Event) {
        let snapshot: Vec<ListenerFn> = {
            let guard = self
                .inner
                .listeners
                .read()
                .expect("listener lock poisoned");
            guard.iter().map(|(_, f)| f.clone()).collect()
        };
        for cb in snapshot {
            cb(ev);
        }
    }
}
