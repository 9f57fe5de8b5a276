//! Mutation events
//!
//! Every observable mutation is described by an [`Event`] delivered to
//! listeners at flush time. Between the mutation and the flush, events live
//! in the scheduler queue as [`PendingEvent`]s: a compact per-path record
//! that absorbs later mutations of the same path so each listener sees at
//! most one create/update/delete per path per flush.
//!
//! Apply events never collapse; they are replayed in call order. Relabel
//! events compose, so a flush carries at most one per node.

use serde::Serialize;
use smallvec::SmallVec;

use crate::reactive::path::Path;
use crate::value::Value;

/// Path-rename pairs carried by a relabel. Index shifts from array edits
/// are small in the common case.
pub(crate) type LabelPairs = SmallVec<[(Path, Path); 4]>;

/// A mutation notification, keyed by the dotted path of the affected slot
/// relative to the node the listener is attached to.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// A key that did not exist was introduced.
    #[serde(rename_all = "camelCase")]
    Create {
        path: Path,
        new_value: Value,
        /// Present for creates that replace a prior reading of the slot,
        /// such as a length assignment that grew the array.
        old_value: Option<Value>,
    },
    /// An existing key changed value.
    #[serde(rename_all = "camelCase")]
    Update {
        path: Path,
        new_value: Value,
        old_value: Option<Value>,
    },
    /// A key was removed.
    #[serde(rename_all = "camelCase")]
    Delete { path: Path, old_value: Value },
    /// A function reachable from this node was invoked.
    #[serde(rename_all = "camelCase")]
    Apply { path: Path, args: Vec<Value> },
    /// Elements moved to new paths without changing identity. Each pair is
    /// `(old_path, new_path)`.
    #[serde(rename_all = "camelCase")]
    Relabel { labels: Vec<(Path, Path)> },
}

impl Event {
    /// The path the event is keyed on. Relabels describe many paths and
    /// have none.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Event::Create { path, .. }
            | Event::Update { path, .. }
            | Event::Delete { path, .. }
            | Event::Apply { path, .. } => Some(path),
            Event::Relabel { .. } => None,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Event::Create { .. } => "create",
            Event::Update { .. } => "update",
            Event::Delete { .. } => "delete",
            Event::Apply { .. } => "apply",
            Event::Relabel { .. } => "relabel",
        }
    }
}

/// What a single mutation did to its path, before batch collapse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MutKind {
    Create,
    Update,
    Delete,
}

/// Net effect of all mutations of one path within the current batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NetKind {
    Create,
    Update,
    Delete,
    /// A key created and deleted within the same batch: nothing to report.
    Annihilated,
}

/// One queued per-path mutation record. `old` is the value the path held
/// before the first mutation of the batch touched it; the new value is not
/// stored but read fresh at flush time.
#[derive(Clone, Debug)]
pub(crate) struct PendingMutation {
    pub path: Path,
    pub net: NetKind,
    pub old: Option<Value>,
}

impl PendingMutation {
    pub fn new(path: Path, kind: MutKind, old: Option<Value>) -> Self {
        let net = match kind {
            MutKind::Create => NetKind::Create,
            MutKind::Update => NetKind::Update,
            MutKind::Delete => NetKind::Delete,
        };
        PendingMutation { path, net, old }
    }

    /// Fold a later mutation of the same path into this record. The first
    /// captured old value is kept so the final event spans the whole batch.
    pub fn absorb(&mut self, kind: MutKind, old: Option<Value>) {
        self.net = match (self.net, kind) {
            // The key did not exist before the batch; later edits refine
            // what the create reports, and a delete cancels it outright.
            (NetKind::Create, MutKind::Update) => NetKind::Create,
            (NetKind::Create, MutKind::Delete) => {
                self.old = None;
                NetKind::Annihilated
            }
            (NetKind::Create, MutKind::Create) => NetKind::Create,

            (NetKind::Update, MutKind::Update) => NetKind::Update,
            (NetKind::Update, MutKind::Delete) => NetKind::Delete,
            (NetKind::Update, MutKind::Create) => NetKind::Update,

            // The key existed before the batch, so delete-then-create is a
            // net update of the pre-batch value.
            (NetKind::Delete, MutKind::Create) => NetKind::Update,
            (NetKind::Delete, MutKind::Update) => NetKind::Update,
            (NetKind::Delete, MutKind::Delete) => NetKind::Delete,

            // Resurrection after annihilation starts a fresh create; the
            // incoming old value (if any) belongs to the new lifetime.
            (NetKind::Annihilated, MutKind::Create) => {
                self.net = NetKind::Create;
                self.old = old;
                return;
            }
            (NetKind::Annihilated, MutKind::Update) => NetKind::Update,
            (NetKind::Annihilated, MutKind::Delete) => NetKind::Delete,
        };
        if self.net == NetKind::Annihilated {
            return;
        }
        // A net create keeps the old value it was constructed with (none
        // for a key born in the batch); later edits must not smuggle a
        // mid-batch reading in as the pre-batch value.
        if self.net != NetKind::Create && self.old.is_none() {
            self.old = old;
        }
    }
}

/// A queued event awaiting flush, relative to some node's root.
#[derive(Clone, Debug)]
pub(crate) enum PendingEvent {
    Mutation(PendingMutation),
    Apply { path: Path, args: Vec<Value> },
    Relabel { labels: LabelPairs },
}

impl PendingEvent {
    /// Rewrite all paths for delivery one level up: the event observed at
    /// child path `root` of a subscriber.
    pub fn with_prefix(&self, root: &Path) -> PendingEvent {
        match self {
            PendingEvent::Mutation(m) => PendingEvent::Mutation(PendingMutation {
                path: root.join(&m.path),
                net: m.net,
                old: m.old.clone(),
            }),
            PendingEvent::Apply { path, args } => PendingEvent::Apply {
                path: root.join(path),
                args: args.clone(),
            },
            PendingEvent::Relabel { labels } => PendingEvent::Relabel {
                labels: labels
                    .iter()
                    .map(|(from, to)| (root.join(from), root.join(to)))
                    .collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(kind: MutKind, old: Option<Value>) -> PendingMutation {
        PendingMutation::new(Path::root().key("x"), kind, old)
    }

    #[test]
    fn create_then_update_stays_create() {
        let mut m = pending(MutKind::Create, None);
        m.absorb(MutKind::Update, Some(Value::Int(1)));
        assert_eq!(m.net, NetKind::Create);
        // A key born in this batch has no pre-batch value.
        assert!(m.old.is_none());
    }

    #[test]
    fn create_then_delete_annihilates() {
        let mut m = pending(MutKind::Create, None);
        m.absorb(MutKind::Delete, Some(Value::Int(1)));
        assert_eq!(m.net, NetKind::Annihilated);
        assert!(m.old.is_none());
    }

    #[test]
    fn delete_then_create_is_update() {
        let mut m = pending(MutKind::Delete, Some(Value::Int(1)));
        m.absorb(MutKind::Create, None);
        assert_eq!(m.net, NetKind::Update);
        assert_eq!(m.old, Some(Value::Int(1)));
    }

    #[test]
    fn first_old_value_wins() {
        let mut m = pending(MutKind::Update, Some(Value::Int(1)));
        m.absorb(MutKind::Update, Some(Value::Int(2)));
        m.absorb(MutKind::Update, Some(Value::Int(3)));
        assert_eq!(m.net, NetKind::Update);
        assert_eq!(m.old, Some(Value::Int(1)));
    }

    #[test]
    fn annihilated_then_create_restarts() {
        let mut m = pending(MutKind::Create, None);
        m.absorb(MutKind::Delete, None);
        m.absorb(MutKind::Create, None);
        assert_eq!(m.net, NetKind::Create);
    }

    #[test]
    fn prefix_rewrites_all_paths() {
        let root = Path::root().key("child");
        let ev = PendingEvent::Apply {
            path: Path::root().key("fn"),
            args: vec![],
        };
        match ev.with_prefix(&root) {
            PendingEvent::Apply { path, .. } => assert_eq!(path.as_str(), ".child.fn"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
