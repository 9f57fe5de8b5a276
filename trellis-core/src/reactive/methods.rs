//! Tracked container methods
//!
//! Indexed reads, iteration, and the structural mutation methods of array
//! and map targets. Every mutation method runs the same way: snapshot the
//! container, apply the raw edit, snapshot again, then describe the
//! difference as events. The description is always the apply event for the
//! call itself, a relabel for elements that moved, a create/update/delete
//! for every index or key whose occupant changed, and a length update when
//! the length changed.
//!
//! Deriving events from the before/after diff rather than per-method
//! scripts keeps each path's reported transition honest: a slot whose
//! value ends up unchanged emits nothing, no matter which method touched
//! it.

use std::cmp::Ordering as CmpOrdering;

use crate::error::Error;
use crate::graph::relabel::{self, IdKey};
use crate::graph::subscriptions::DepKey;
use crate::reactive::event::{MutKind, PendingEvent};
use crate::reactive::node::{Reactive, Target};
use crate::reactive::path::Path;
use crate::reactive::runtime;
use crate::value::Value;

impl Reactive {
    /// Read one array element. Indexed reads depend on the array's shape
    /// as well as the slot: tracked mutation methods must invalidate them
    /// even when they do not touch the index directly.
    pub(crate) fn get_index(&self, index: usize) -> Value {
        let arr = match self.target() {
            Target::Array(a) => a.clone(),
            _ => return Value::Null,
        };
        let path = Path::root().index(index);
        self.track_read(&[DepKey::Path(path.clone()), DepKey::Structure]);
        let stored = {
            let guard = arr.read().expect("array lock poisoned");
            guard.get(index).cloned()
        };
        match stored {
            Some(v) => self.wrap_child(&path, v),
            None => Value::Null,
        }
    }

    pub(crate) fn set_index(&self, index: usize, value: Value) -> bool {
        self.run_array_script("set_index", None, MutKind::Update, move |vec| {
            if index >= vec.len() {
                vec.resize(index + 1, Value::Null);
            }
            vec[index] = value;
        })
        .is_ok()
    }

    /// Assigning `length` past the current bounds reports the length slot
    /// as a create: the assignment is what introduced the new indices.
    pub(crate) fn set_len(&self, new_len: usize) -> bool {
        self.run_array_script("set_length", None, MutKind::Create, move |vec| {
            vec.resize(new_len, Value::Null);
        })
        .is_ok()
    }

    pub(crate) fn push(&self, value: Value) -> Result<usize, Error> {
        let arg = value.clone();
        self.run_array_script("push", Some(vec![arg]), MutKind::Update, move |vec| {
            vec.push(value);
            vec.len()
        })
    }

    pub(crate) fn pop(&self) -> Result<Value, Error> {
        let removed =
            self.run_array_script("pop", Some(Vec::new()), MutKind::Update, |vec| vec.pop())?;
        Ok(removed.map(runtime::reactive).unwrap_or(Value::Null))
    }

    pub(crate) fn shift(&self) -> Result<Value, Error> {
        let removed = self.run_array_script("shift", Some(Vec::new()), MutKind::Update, |vec| {
            if vec.is_empty() {
                None
            } else {
                Some(vec.remove(0))
            }
        })?;
        Ok(removed.map(runtime::reactive).unwrap_or(Value::Null))
    }

    pub(crate) fn unshift(&self, values: Vec<Value>) -> Result<usize, Error> {
        let args = values.clone();
        self.run_array_script("unshift", Some(args), MutKind::Update, move |vec| {
            vec.splice(0..0, values);
            vec.len()
        })
    }

    pub(crate) fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>, Error> {
        let mut args = vec![Value::from(start), Value::from(delete_count)];
        args.extend(items.iter().cloned());
        let removed = self.run_array_script("splice", Some(args), MutKind::Update, move |vec| {
            let len = vec.len();
            let start = start.min(len);
            let end = (start + delete_count).min(len);
            vec.splice(start..end, items).collect::<Vec<_>>()
        })?;
        Ok(removed.into_iter().map(runtime::reactive).collect())
    }

    pub(crate) fn reverse(&self) -> Result<(), Error> {
        self.run_array_script("reverse", Some(Vec::new()), MutKind::Update, |vec| {
            vec.reverse()
        })
    }

    pub(crate) fn sort_by<F>(&self, cmp: F) -> Result<(), Error>
    where
        F: FnMut(&Value, &Value) -> CmpOrdering,
    {
        // Sort a snapshot; the comparator is user code and must run
        // outside the array lock so it can read the array it is ordering.
        let sorted = match self.target() {
            Target::Array(a) => {
                let mut vals = a.read().expect("array lock poisoned").clone();
                let mut cmp = cmp;
                vals.sort_by(|x, y| cmp(x, y));
                vals
            }
            other => {
                return Err(Error::KindMismatch {
                    op: "sort",
                    expected: "array",
                    found: other.kind_name(),
                })
            }
        };
        self.run_array_script("sort", Some(Vec::new()), MutKind::Update, move |vec| {
            *vec = sorted;
        })
    }

    /// Snapshot, mutate, diff. The mutation itself runs under the array
    /// lock; everything observable is derived from the two snapshots after
    /// the lock is released. `grow_kind` is the kind reported for the
    /// `.length` slot when the array grew.
    fn run_array_script<R>(
        &self,
        op: &'static str,
        apply_args: Option<Vec<Value>>,
        grow_kind: MutKind,
        mutate: impl FnOnce(&mut Vec<Value>) -> R,
    ) -> Result<R, Error> {
        let arr = match self.target() {
            Target::Array(a) => a.clone(),
            other => {
                return Err(Error::KindMismatch {
                    op,
                    expected: "array",
                    found: other.kind_name(),
                })
            }
        };

        let (old_vals, old_ids): (Vec<Value>, Vec<IdKey>) = {
            let guard = arr.read().expect("array lock poisoned");
            (guard.clone(), guard.iter().map(relabel::id_key).collect())
        };
        // Old values as listeners knew them, captured before any
        // bookkeeping moves.
        let captured: Vec<Value> = old_vals
            .iter()
            .enumerate()
            .map(|(i, v)| self.capture_old(&Path::root().index(i), v))
            .collect();

        let ret = {
            let mut guard = arr.write().expect("array lock poisoned");
            mutate(&mut guard)
        };

        let (new_vals, new_ids): (Vec<Value>, Vec<IdKey>) = {
            let guard = arr.read().expect("array lock poisoned");
            (guard.clone(), guard.iter().map(relabel::id_key).collect())
        };

        if let Some(args) = apply_args {
            self.emit(PendingEvent::Apply {
                path: Path::root().key(op),
                args,
            });
        }

        let diff = relabel::diff_labels(&old_ids, &new_ids);

        // Old positions whose element is gone lose their wrapped-child
        // bookkeeping before survivors are moved into place.
        for (i, matched) in diff.matched_old.iter().enumerate() {
            if !matched {
                self.prune_child(&Path::root().index(i));
            }
        }
        self.apply_relabel(&diff.pairs);

        let old_len = old_vals.len();
        let new_len = new_vals.len();
        for i in 0..old_len.max(new_len) {
            let path = Path::root().index(i);
            match (old_vals.get(i), new_vals.get(i)) {
                (Some(old), Some(new)) => {
                    if !old.same(new) {
                        self.adopt(&path, new);
                        self.emit_mutation(path, MutKind::Update, Some(captured[i].clone()));
                    }
                }
                (None, Some(new)) => {
                    self.adopt(&path, new);
                    self.emit_mutation(path, MutKind::Create, None);
                }
                (Some(_), None) => {
                    self.emit_mutation(path, MutKind::Delete, Some(captured[i].clone()));
                }
                (None, None) => unreachable!("index below max of both lengths"),
            }
        }

        if old_len != new_len {
            let kind = if new_len > old_len {
                grow_kind
            } else {
                MutKind::Update
            };
            self.emit_mutation(
                Path::root().key("length"),
                kind,
                Some(Value::Int(old_len as i64)),
            );
            self.invalidate_structural();
        } else if !diff.pairs.is_empty() {
            // Same length but elements moved: still a shape change.
            self.invalidate_structural();
        }

        Ok(ret)
    }
}

// ----------------------------------------------------------------------------
// Map methods
// ----------------------------------------------------------------------------

impl Reactive {
    pub(crate) fn map_set(&self, key: &str, value: Value) -> bool {
        let m = match self.target() {
            Target::Map(m) => m.clone(),
            _ => return false,
        };
        let path = Path::root().key(key);
        let existing = {
            let guard = m.read().expect("map lock poisoned");
            guard.get(key).cloned()
        };

        self.emit(PendingEvent::Apply {
            path: Path::root().key("set"),
            args: vec![Value::from(key), value.clone()],
        });

        match existing {
            Some(old) => {
                if old.same(&value) {
                    return true;
                }
                let old_cap = self.capture_old(&path, &old);
                self.prune_child(&path);
                {
                    let mut guard = m.write().expect("map lock poisoned");
                    guard.insert(key.to_string(), value.clone());
                }
                self.adopt(&path, &value);
                self.emit_mutation(path, MutKind::Update, Some(old_cap));
            }
            None => {
                {
                    let mut guard = m.write().expect("map lock poisoned");
                    guard.insert(key.to_string(), value.clone());
                }
                self.adopt(&path, &value);
                self.emit_mutation(path, MutKind::Create, None);
                self.invalidate_structural();
            }
        }
        true
    }

    pub(crate) fn map_delete(&self, key: &str) -> bool {
        let m = match self.target() {
            Target::Map(m) => m.clone(),
            _ => return false,
        };
        let path = Path::root().key(key);
        let existing = {
            let guard = m.read().expect("map lock poisoned");
            guard.get(key).cloned()
        };

        self.emit(PendingEvent::Apply {
            path: Path::root().key("delete"),
            args: vec![Value::from(key)],
        });

        let Some(old) = existing else {
            return true;
        };
        let old_cap = self.capture_old(&path, &old);
        self.prune_child(&path);
        {
            let mut guard = m.write().expect("map lock poisoned");
            guard.shift_remove(key);
        }
        self.emit_mutation(path, MutKind::Delete, Some(old_cap));
        self.invalidate_structural();
        true
    }

    pub(crate) fn clear(&self) -> Result<(), Error> {
        let m = match self.target() {
            Target::Map(m) => m.clone(),
            other => {
                return Err(Error::KindMismatch {
                    op: "clear",
                    expected: "map",
                    found: other.kind_name(),
                })
            }
        };
        let entries: Vec<(String, Value)> = {
            let guard = m.read().expect("map lock poisoned");
            guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let captured: Vec<(Path, Value)> = entries
            .iter()
            .map(|(k, v)| {
                let path = Path::root().key(k);
                let old = self.capture_old(&path, v);
                (path, old)
            })
            .collect();

        {
            let mut guard = m.write().expect("map lock poisoned");
            guard.clear();
        }

        self.emit(PendingEvent::Apply {
            path: Path::root().key("clear"),
            args: Vec::new(),
        });
        for (path, old) in captured {
            self.prune_child(&path);
            self.emit_mutation(path, MutKind::Delete, Some(old));
        }
        if !entries.is_empty() {
            self.invalidate_structural();
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Iteration
// ----------------------------------------------------------------------------

impl Reactive {
    /// Snapshot of the values in order, each read through the normal slot
    /// traps so getters evaluate and containers wrap exactly as a direct
    /// read would. Iteration additionally depends on the container's shape.
    pub(crate) fn iter_values(&self) -> Vec<Value> {
        match self.target().clone() {
            Target::Array(a) => {
                let len = a.read().expect("array lock poisoned").len();
                self.track_read(&[DepKey::Structure]);
                (0..len).map(|i| self.get_index(i)).collect()
            }
            Target::Map(m) => {
                let keys: Vec<String> = {
                    let guard = m.read().expect("map lock poisoned");
                    guard.keys().cloned().collect()
                };
                self.track_read(&[DepKey::Structure]);
                keys.iter().map(|k| self.get(k)).collect()
            }
            Target::Object(o) => {
                let keys = o.read().expect("object lock poisoned").keys();
                self.track_read(&[DepKey::Structure]);
                keys.iter().map(|k| self.get(k)).collect()
            }
            Target::Func(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use crate::graph::scheduler::flush_sync;
    use crate::reactive::event::Event;
    use crate::reactive::runtime::{is_reactive, listen, reactive, ListenerGuard};
    use crate::value::Value;

    fn record(value: &Value) -> (Arc<Mutex<Vec<Event>>>, ListenerGuard) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let guard = listen(value, move |ev| sink.lock().unwrap().push(ev.clone()));
        (events, guard)
    }

    fn kinds_and_paths(events: &[Event]) -> Vec<(&'static str, String)> {
        events
            .iter()
            .map(|e| {
                let path = e.path().map(|p| p.as_str().to_string()).unwrap_or_default();
                (e.kind_str(), path)
            })
            .collect()
    }

    #[test]
    fn length_growth_reports_creates() {
        let r = reactive(json!([1, 2]));
        let (events, _guard) = record(&r);

        assert!(r.set("length", 4));
        flush_sync();

        let events = events.lock().unwrap();
        assert_eq!(
            kinds_and_paths(&events),
            vec![
                ("create", ".2".to_string()),
                ("create", ".3".to_string()),
                ("create", ".length".to_string()),
            ]
        );
        match &events[2] {
            Event::Create {
                new_value,
                old_value,
                ..
            } => {
                assert_eq!(*new_value, Value::Int(4));
                assert_eq!(*old_value, Some(Value::Int(2)));
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn length_shrink_reports_deletes() {
        let r = reactive(json!([1, 2, 3]));
        let (events, _guard) = record(&r);

        assert!(r.set("length", 1));
        flush_sync();

        let events = events.lock().unwrap();
        assert_eq!(
            kinds_and_paths(&events),
            vec![
                ("delete", ".1".to_string()),
                ("delete", ".2".to_string()),
                ("update", ".length".to_string()),
            ]
        );
        match &events[0] {
            Event::Delete { old_value, .. } => assert_eq!(*old_value, Value::Int(2)),
            other => panic!("expected delete, got {other:?}"),
        }
    }

    #[test]
    fn reverse_relabels_moved_elements() {
        let arr = reactive(json!([{"i": 0}, {"i": 1}, {"i": 2}]));
        let (events, _guard) = record(&arr);

        arr.reverse().unwrap();
        flush_sync();

        let events = events.lock().unwrap();
        assert_eq!(
            kinds_and_paths(&events),
            vec![
                ("apply", ".reverse".to_string()),
                ("relabel", String::new()),
                ("update", ".0".to_string()),
                ("update", ".2".to_string()),
            ]
        );
        // The middle element stayed put, so only the outer two move.
        match &events[1] {
            Event::Relabel { labels } => {
                let moves: Vec<(&str, &str)> = labels
                    .iter()
                    .map(|(f, t)| (f.as_str(), t.as_str()))
                    .collect();
                assert_eq!(moves, vec![(".2", ".0"), (".0", ".2")]);
            }
            other => panic!("expected relabel, got {other:?}"),
        }
    }

    #[test]
    fn sort_relabels_by_identity() {
        let arr = reactive(json!([{"v": 3}, {"v": 1}, {"v": 2}]));
        let (events, _guard) = record(&arr);

        arr.sort_by(|a, b| {
            let a = a.get("v").as_int().unwrap_or(0);
            let b = b.get("v").as_int().unwrap_or(0);
            a.cmp(&b)
        })
        .unwrap();
        flush_sync();

        assert_eq!(arr.get_index(0).get("v"), Value::Int(1));
        assert_eq!(arr.get_index(2).get("v"), Value::Int(3));

        let events = events.lock().unwrap();
        let relabels: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::Relabel { labels } => Some(labels.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(relabels.len(), 1);
        let moves: Vec<(&str, &str)> = relabels[0]
            .iter()
            .map(|(f, t)| (f.as_str(), t.as_str()))
            .collect();
        assert_eq!(moves, vec![(".1", ".0"), (".2", ".1"), (".0", ".2")]);
    }

    #[test]
    fn sort_comparators_may_read_the_array() {
        let arr = reactive(json!([3, 1, 2]));
        let handle = arr.clone();

        arr.sort_by(move |x, y| {
            // User comparators are free to read the array being sorted.
            assert_eq!(handle.len(), 3);
            x.as_int().unwrap_or(0).cmp(&y.as_int().unwrap_or(0))
        })
        .unwrap();

        assert_eq!(arr.get_index(0), Value::Int(1));
        assert_eq!(arr.get_index(1), Value::Int(2));
        assert_eq!(arr.get_index(2), Value::Int(3));
        flush_sync();
    }

    #[test]
    fn clear_deletes_every_map_entry() {
        let m = reactive(Value::map(vec![
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Int(2)),
        ]));
        let (events, _guard) = record(&m);

        m.clear().unwrap();
        flush_sync();

        let events = events.lock().unwrap();
        assert_eq!(
            kinds_and_paths(&events),
            vec![
                ("apply", ".clear".to_string()),
                ("delete", ".a".to_string()),
                ("delete", ".b".to_string()),
            ]
        );
    }

    #[test]
    fn splice_returns_removed_values_wrapped() {
        let arr = reactive(json!([{"x": 1}, 2, 3]));

        let removed = arr.splice(0, 2, Vec::new()).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(is_reactive(&removed[0]));
        assert_eq!(removed[0].get("x"), Value::Int(1));
        assert_eq!(removed[1], Value::Int(2));

        assert_eq!(arr.len(), 1);
        assert_eq!(arr.get_index(0), Value::Int(3));
        flush_sync();
    }
}
