//! Positional relabeling
//!
//! Structural array mutations move elements to new indices without changing
//! their identity. Subscriptions and wrapped-child bookkeeping are keyed by
//! path, so every such move must be described as `(old_path, new_path)`
//! pairs: plain subscription edges get rewritten in place, and listeners
//! receive a relabel event.
//!
//! The pairing is computed by diffing identity keys before and after the
//! mutation. These are pure functions over the two snapshots, kept free of
//! node state so the matching rules are testable in isolation.

use std::collections::{HashMap, VecDeque};

use crate::reactive::event::LabelPairs;
use crate::reactive::path::Path;
use crate::value::Value;

/// Identity of an array element for relabel matching. Containers, functions
/// and nodes carry pointer identity; scalars carry none, since no
/// subscription bookkeeping can be attached to them.
pub(crate) type IdKey = Option<usize>;

pub(crate) fn id_key(value: &Value) -> IdKey {
    use std::sync::Arc;
    match value {
        Value::Object(o) => Some(Arc::as_ptr(o) as usize),
        Value::Array(a) => Some(Arc::as_ptr(a) as usize),
        Value::Map(m) => Some(Arc::as_ptr(m) as usize),
        Value::Func(f) => Some(Arc::as_ptr(f) as *const () as usize),
        Value::Getter(g) => Some(Arc::as_ptr(g) as *const () as usize),
        Value::Node(n) => Some(n.target_key()),
        _ => None,
    }
}

/// Result of diffing two identity snapshots of the same array.
pub(crate) struct LabelDiff {
    /// `(old_path, new_path)` for every element that moved.
    pub pairs: LabelPairs,
    /// Per old position, whether its element is still present. Unmatched
    /// positions lost their element and any wrapped-child bookkeeping for
    /// them must be pruned.
    pub matched_old: Vec<bool>,
}

/// Diff two identity snapshots of the same array.
///
/// Each new position is matched against the old positions that held the
/// same identity. Duplicate references are paired first-remaining-match-
/// wins, in ascending position order, which is deterministic and keeps an
/// element that did not move matched to itself. Pairs come out ascending
/// by destination index, the order subscribers see in the relabel event.
/// Unmatched new positions were inserted; insertions and removals are
/// reported by the accompanying per-index events, not here.
pub(crate) fn diff_labels(old: &[IdKey], new: &[IdKey]) -> LabelDiff {
    let mut positions: HashMap<usize, VecDeque<usize>> = HashMap::new();
    for (i, key) in old.iter().enumerate() {
        if let Some(k) = key {
            positions.entry(*k).or_default().push_back(i);
        }
    }

    let mut pairs = LabelPairs::new();
    let mut matched_old = vec![false; old.len()];
    for (j, key) in new.iter().enumerate() {
        let Some(k) = key else { continue };
        let Some(queue) = positions.get_mut(k) else { continue };
        if let Some(i) = queue.pop_front() {
            matched_old[i] = true;
            if i != j {
                pairs.push((Path::root().index(i), Path::root().index(j)));
            }
        }
    }
    LabelDiff { pairs, matched_old }
}

/// Compose two relabelings applied in sequence into one net relabeling.
///
/// A pair `(a, b)` followed by `(b, c)` chains to `(a, c)`; pairs of the
/// second relabeling whose source was not produced by the first pass
/// through unchanged. Identity pairs are dropped.
pub(crate) fn compose_labels(first: &LabelPairs, second: &LabelPairs) -> LabelPairs {
    let mut out = LabelPairs::new();
    let mut chained = vec![false; second.len()];

    for (a, b) in first {
        let mut target = b;
        if let Some(idx) = second.iter().position(|(from, _)| from == b) {
            chained[idx] = true;
            target = &second[idx].1;
        }
        if a != target {
            out.push((a.clone(), target.clone()));
        }
    }

    for (idx, (from, to)) in second.iter().enumerate() {
        if !chained[idx] && from != to {
            out.push((from.clone(), to.clone()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ids: &[usize]) -> Vec<IdKey> {
        ids.iter().map(|&k| if k == 0 { None } else { Some(k) }).collect()
    }

    fn pair(from: usize, to: usize) -> (Path, Path) {
        (Path::root().index(from), Path::root().index(to))
    }

    #[test]
    fn shift_moves_every_survivor_down() {
        // [a, b, c] -> [b, c]
        let old = keys(&[10, 20, 30]);
        let new = keys(&[20, 30]);
        let diff = diff_labels(&old, &new);
        assert_eq!(diff.pairs.to_vec(), vec![pair(1, 0), pair(2, 1)]);
        assert_eq!(diff.matched_old, vec![false, true, true]);
    }

    #[test]
    fn unshift_moves_every_survivor_up() {
        // [a, b] -> [x, a, b]
        let old = keys(&[10, 20]);
        let new = keys(&[99, 10, 20]);
        let diff = diff_labels(&old, &new);
        assert_eq!(diff.pairs.to_vec(), vec![pair(0, 1), pair(1, 2)]);
        assert_eq!(diff.matched_old, vec![true, true]);
    }

    #[test]
    fn stationary_elements_produce_no_pairs() {
        let old = keys(&[10, 20, 30]);
        let diff = diff_labels(&old, &old);
        assert!(diff.pairs.is_empty());
        assert_eq!(diff.matched_old, vec![true, true, true]);
    }

    #[test]
    fn scalars_are_not_tracked() {
        // Scalar slots carry no identity, so a reverse of scalars is
        // reported purely through per-index updates.
        let old = keys(&[0, 0, 0]);
        let new = keys(&[0, 0, 0]);
        let diff = diff_labels(&old, &new);
        assert!(diff.pairs.is_empty());
        assert_eq!(diff.matched_old, vec![false, false, false]);
    }

    #[test]
    fn duplicates_match_first_remaining_position() {
        // [a, a] reversed is still [a, a]: both occurrences match in order
        // and nothing appears to move.
        let old = keys(&[10, 10]);
        let new = keys(&[10, 10]);
        assert!(diff_labels(&old, &new).pairs.is_empty());

        // [a, b, a] -> [a, a, b]: the first `a` stays at 0, the second
        // takes the next remaining slot. Pairs are ordered by destination.
        let old = keys(&[10, 20, 10]);
        let new = keys(&[10, 10, 20]);
        let diff = diff_labels(&old, &new);
        assert_eq!(diff.pairs.to_vec(), vec![pair(2, 1), pair(1, 2)]);
    }

    #[test]
    fn removed_elements_yield_no_pair() {
        // [a, b] -> [b]
        let old = keys(&[10, 20]);
        let new = keys(&[20]);
        let diff = diff_labels(&old, &new);
        assert_eq!(diff.pairs.to_vec(), vec![pair(1, 0)]);
        assert_eq!(diff.matched_old, vec![false, true]);
    }

    #[test]
    fn compose_chains_through_intermediate_positions() {
        let first: LabelPairs = [pair(0, 1), pair(1, 2)].into_iter().collect();
        let second: LabelPairs = [pair(1, 0), pair(2, 1)].into_iter().collect();
        // 0 -> 1 -> 0 cancels; 1 -> 2 -> 1 cancels.
        assert!(compose_labels(&first, &second).is_empty());
    }

    #[test]
    fn compose_keeps_unchained_pairs() {
        let first: LabelPairs = [pair(0, 1)].into_iter().collect();
        let second: LabelPairs = [pair(3, 4)].into_iter().collect();
        let composed = compose_labels(&first, &second);
        assert_eq!(composed.to_vec(), vec![pair(0, 1), pair(3, 4)]);
    }
}
