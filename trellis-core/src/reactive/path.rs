//! Dotted-path representation for locations inside a reactive value tree.
//!
//! A path is either the root (`""`), denoting the node as a whole, or a
//! sequence of `.segment` components. All segments pass through a single
//! escaping function, so a property literally named `a.b` can never collide
//! with the nested path `.a.b`.

use std::fmt;

use serde::Serialize;

/// Canonical dotted path. `""` is the root; every other path starts with `.`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Path(String);

impl Path {
    /// The root path, denoting a node as a whole.
    pub fn root() -> Self {
        Path(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a property-key segment, escaping `.` and `\`.
    pub fn key(&self, key: &str) -> Path {
        let mut out = String::with_capacity(self.0.len() + key.len() + 1);
        out.push_str(&self.0);
        out.push('.');
        for ch in key.chars() {
            match ch {
                '.' => out.push_str("\\."),
                '\\' => out.push_str("\\\\"),
                _ => out.push(ch),
            }
        }
        Path(out)
    }

    /// Append an array-index segment.
    pub fn index(&self, index: usize) -> Path {
        Path(format!("{}.{index}", self.0))
    }

    /// Concatenate two paths. Joining with the root on either side is the
    /// identity.
    pub fn join(&self, other: &Path) -> Path {
        if self.is_root() {
            return other.clone();
        }
        let mut out = String::with_capacity(self.0.len() + other.0.len());
        out.push_str(&self.0);
        out.push_str(&other.0);
        Path(out)
    }

    /// Segment-boundary-aware prefix check: `.a` contains `.a` and `.a.b`
    /// but not `.ab`.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        if prefix.is_root() {
            return true;
        }
        if !self.0.starts_with(&prefix.0) {
            return false;
        }
        match self.0.as_bytes().get(prefix.0.len()) {
            None => true,
            Some(b'.') => true,
            Some(_) => false,
        }
    }

    /// Rewrite the `old` prefix of this path to `new`. Returns `None` when
    /// the path does not lie under `old`.
    pub fn rebase(&self, old: &Path, new: &Path) -> Option<Path> {
        if !self.starts_with(old) {
            return None;
        }
        let rest = Path(self.0[old.0.len()..].to_string());
        Some(new.join(&rest))
    }

    /// Split off the first segment, unescaped, together with the remainder.
    pub fn split_first(&self) -> Option<(String, Path)> {
        if self.is_root() {
            return None;
        }
        let raw = &self.0[1..];
        let mut segment = String::new();
        let mut chars = raw.char_indices();
        while let Some((i, ch)) = chars.next() {
            match ch {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        segment.push(escaped);
                    }
                }
                '.' => {
                    let rest = Path(format!(".{}", &raw[i + 1..]));
                    return Some((segment, rest));
                }
                _ => segment.push(ch),
            }
        }
        Some((segment, Path::root()))
    }

    /// All segments of the path, unescaped.
    pub fn segments(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut rest = self.clone();
        while let Some((segment, tail)) = rest.split_first() {
            out.push(segment);
            rest = tail;
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
