//! Per-node subscription storage
//!
//! Every reactive node carries a [`SubscriptionGraph`]: the set of nodes
//! that want to hear about its mutations, discovered dynamically as values
//! are read. Two edge flavors share the storage:
//!
//! - plain edges, created when a parent wraps a child it holds. The edge's
//!   `root` is the child's path inside the parent; bubbled events are
//!   rewritten under that prefix.
//! - getter edges, created while a getter body reads through this node.
//!   The edge's `root` is the getter slot's path on the owner, and `deps`
//!   records exactly which reads to react to.
//!
//! Subscribers are held weakly. A dropped subscriber is pruned the next
//! time the graph is walked, so nodes never keep their parents alive.

use std::sync::Weak;

use smallvec::SmallVec;

use crate::reactive::node::{NodeId, NodeInner, Reactive};
use crate::reactive::path::Path;

/// A single tracked read, as recorded on a getter edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DepKey {
    /// A read of one slot, by path relative to the read node.
    Path(Path),
    /// A read of the node's shape: length, key set, iteration order.
    /// Invalidated by any structural mutation of the node.
    Structure,
}

/// One subscription edge from this node to a subscriber.
#[derive(Clone, Debug)]
pub(crate) struct Edge {
    /// Path context on the subscriber: mount point for plain edges, getter
    /// slot for getter edges.
    pub root: Path,
    /// Getter edges invalidate a cache slot; plain edges forward events.
    pub derived: bool,
    /// Tracked reads. Empty for plain edges, which forward everything.
    pub deps: SmallVec<[DepKey; 4]>,
}

impl Edge {
    /// Whether a mutation at `path` hits one of this edge's tracked reads.
    pub fn hit_by(&self, path: &Path) -> bool {
        self.deps.iter().any(|d| matches!(d, DepKey::Path(p) if p == path))
    }

    pub fn depends_on_structure(&self) -> bool {
        self.deps.iter().any(|d| matches!(d, DepKey::Structure))
    }
}

struct SubEntry {
    id: NodeId,
    subscriber: Weak<NodeInner>,
    edges: SmallVec<[Edge; 2]>,
}

/// All subscriptions of one node. Insertion order is preserved, which keeps
/// event delivery deterministic.
#[derive(Default)]
pub(crate) struct SubscriptionGraph {
    entries: Vec<SubEntry>,
}

impl SubscriptionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an edge, merging with an existing one for the same
    /// subscriber, root, and flavor. Returns `true` if the edge is new.
    pub fn insert(
        &mut self,
        id: NodeId,
        subscriber: Weak<NodeInner>,
        root: Path,
        derived: bool,
        deps: &[DepKey],
    ) -> bool {
        let entry = match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => entry,
            None => {
                self.entries.push(SubEntry {
                    id,
                    subscriber,
                    edges: SmallVec::new(),
                });
                self.entries.last_mut().expect("entry just pushed")
            }
        };

        if let Some(edge) = entry
            .edges
            .iter_mut()
            .find(|e| e.derived == derived && e.root == root)
        {
            for dep in deps {
                if !edge.deps.contains(dep) {
                    edge.deps.push(dep.clone());
                }
            }
            return false;
        }

        entry.edges.push(Edge {
            root,
            derived,
            deps: deps.iter().cloned().collect(),
        });
        true
    }

    /// Drop the edges toward `id` rooted at `root` with the given flavor.
    /// The entry itself goes away with its last edge.
    pub fn remove_edges(&mut self, id: NodeId, root: &Path, derived: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry
                .edges
                .retain(|e| !(e.derived == derived && e.root == *root));
        }
        self.entries.retain(|e| !e.edges.is_empty());
    }

    /// Rewrite the plain edge toward `id` rooted at `old` to be rooted at
    /// `new`. Called when an element is relabeled inside its parent; the
    /// edge must exist, since a wrapped child always subscribes its parent.
    pub fn update_root(&mut self, id: NodeId, old: &Path, new: Path) {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .unwrap_or_else(|| panic!("relabel target has no subscription entry for {id:?}"));
        let edge = entry
            .edges
            .iter_mut()
            .find(|e| !e.derived && e.root == *old)
            .unwrap_or_else(|| panic!("relabel target has no edge rooted at {old}"));
        edge.root = new;
    }

    /// Live subscribers with their edges, pruning any that were dropped.
    pub fn snapshot(&mut self) -> Vec<(NodeId, Reactive, SmallVec<[Edge; 2]>)> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|entry| {
            match entry.subscriber.upgrade() {
                Some(inner) => {
                    live.push((entry.id, Reactive::from_inner(inner), entry.edges.clone()));
                    true
                }
                None => false,
            }
        });
        live
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::runtime::reactive;
    use crate::value::Value;

    fn new_node() -> Reactive {
        match reactive(Value::empty_object()) {
            Value::Node(n) => n,
            other => panic!("expected node, got {other:?}"),
        }
    }

    #[test]
    fn insert_merges_deps_for_same_edge() {
        let sub = new_node();
        let mut graph = SubscriptionGraph::new();
        let root = Path::root().key("total");

        let a = DepKey::Path(Path::root().key("a"));
        let b = DepKey::Path(Path::root().key("b"));

        assert!(graph.insert(sub.id(), sub.downgrade(), root.clone(), true, &[a.clone()]));
        assert!(!graph.insert(sub.id(), sub.downgrade(), root.clone(), true, &[a.clone(), b]));

        let snap = graph.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].2.len(), 1);
        assert_eq!(snap[0].2[0].deps.len(), 2);
        assert!(snap[0].2[0].hit_by(&Path::root().key("a")));
        assert!(snap[0].2[0].hit_by(&Path::root().key("b")));
    }

    #[test]
    fn plain_and_getter_edges_coexist() {
        let sub = new_node();
        let mut graph = SubscriptionGraph::new();
        let root = Path::root().key("child");

        assert!(graph.insert(sub.id(), sub.downgrade(), root.clone(), false, &[]));
        assert!(graph.insert(sub.id(), sub.downgrade(), root.clone(), true, &[DepKey::Structure]));

        let snap = graph.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].2.len(), 2);
    }

    #[test]
    fn remove_edges_drops_empty_entries() {
        let sub = new_node();
        let mut graph = SubscriptionGraph::new();
        let root = Path::root().key("x");

        graph.insert(sub.id(), sub.downgrade(), root.clone(), true, &[DepKey::Structure]);
        graph.remove_edges(sub.id(), &root, true);
        assert!(graph.is_empty());
    }

    #[test]
    fn update_root_moves_plain_edge() {
        let sub = new_node();
        let mut graph = SubscriptionGraph::new();
        let old = Path::root().index(0);
        let new = Path::root().index(1);

        graph.insert(sub.id(), sub.downgrade(), old.clone(), false, &[]);
        graph.update_root(sub.id(), &old, new.clone());

        let snap = graph.snapshot();
        assert_eq!(snap[0].2[0].root, new);
    }

    #[test]
    #[should_panic(expected = "no subscription entry")]
    fn update_root_panics_without_entry() {
        let sub = new_node();
        let mut graph = SubscriptionGraph::new();
        graph.update_root(sub.id(), &Path::root().index(0), Path::root().index(1));
    }

    #[test]
    fn snapshot_prunes_dropped_subscribers() {
        let mut graph = SubscriptionGraph::new();
        {
            let sub = new_node();
            graph.insert(sub.id(), sub.downgrade(), Path::root().key("x"), false, &[]);
            assert_eq!(graph.snapshot().len(), 1);
        }
        // The handle is gone; the entry disappears on the next walk.
        assert_eq!(graph.snapshot().len(), 0);
        assert!(graph.is_empty());
    }
}
