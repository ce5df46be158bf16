//! Positional node addresses and their transformation under operations.
//!
//! A `Path` is the list of child indexes leading from the document root to a
//! node. Paths are only meaningful against the snapshot they were computed
//! for; `Path::transform` recomputes where a node ends up after an operation
//! has been applied elsewhere in the tree.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ops::Operation;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<usize>);

impl Path {
    /// The empty path, addressing the document root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(indexes: Vec<usize>) -> Self {
        Self(indexes)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Index of the node within its parent.
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn parent(&self) -> Option<Path> {
        let (_, head) = self.0.split_last()?;
        Some(Path(head.to_vec()))
    }

    /// Split into the parent path and the index within it.
    pub fn split_last(&self) -> Option<(Path, usize)> {
        let (&last, head) = self.0.split_last()?;
        Some((Path(head.to_vec()), last))
    }

    pub fn child(&self, index: usize) -> Path {
        let mut indexes = self.0.clone();
        indexes.push(index);
        Path(indexes)
    }

    /// Path of the preceding sibling. None for first children and the root.
    pub fn previous(&self) -> Option<Path> {
        let (&last, head) = self.0.split_last()?;
        let index = last.checked_sub(1)?;
        let mut indexes = head.to_vec();
        indexes.push(index);
        Some(Path(indexes))
    }

    /// Path of the following sibling. None for the root or when the index
    /// would overflow.
    pub fn next(&self) -> Option<Path> {
        let (&last, head) = self.0.split_last()?;
        let mut indexes = head.to_vec();
        indexes.push(last.checked_add(1)?);
        Some(Path(indexes))
    }

    /// Document-order comparison. Ancestors compare equal to their descendants.
    pub fn compare(&self, other: &Path) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }

    pub fn is_before(&self, other: &Path) -> bool {
        self.compare(other) == Ordering::Less
    }

    pub fn is_after(&self, other: &Path) -> bool {
        self.compare(other) == Ordering::Greater
    }

    /// True when `self` is a strict prefix of `other`.
    pub fn is_ancestor(&self, other: &Path) -> bool {
        self.len() < other.len() && other.0.starts_with(&self.0)
    }

    pub fn is_descendant(&self, other: &Path) -> bool {
        other.is_ancestor(self)
    }

    /// True when `self` is the direct parent of `other`.
    pub fn is_parent(&self, other: &Path) -> bool {
        self.len() + 1 == other.len() && other.0.starts_with(&self.0)
    }

    /// True for distinct nodes sharing a parent.
    pub fn is_sibling(&self, other: &Path) -> bool {
        if self.len() != other.len() || self.is_root() || self == other {
            return false;
        }
        let n = self.len() - 1;
        self.0[..n] == other.0[..n]
    }

    /// True when `self` ends before `other` at the same depth: same parent
    /// prefix, and a smaller index at `self`'s last position.
    pub fn ends_before(&self, other: &Path) -> bool {
        let Some((&last, head)) = self.0.split_last() else {
            return false;
        };
        let depth = head.len();
        other.len() > depth && other.0[..depth] == *head && last < other.0[depth]
    }

    /// Longest shared prefix.
    pub fn common(&self, other: &Path) -> Path {
        let shared = self
            .0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count();
        Path(self.0[..shared].to_vec())
    }

    /// Where this path points after `op` has been applied.
    ///
    /// Returns None when the node at this path was removed by the operation.
    /// A node that is itself split keeps its path; content that moved into
    /// the new sibling is tracked by `Point::transform`.
    pub fn transform<T>(&self, op: &Operation<T>) -> Option<Path> {
        if self.is_root() {
            return Some(self.clone());
        }

        let mut p = self.0.clone();

        match op {
            Operation::InsertNode { path: op, .. } => {
                if op == self || op.ends_before(self) || op.is_ancestor(self) {
                    p[op.len() - 1] += 1;
                }
            }

            Operation::RemoveNode { path: op, .. } => {
                if op == self || op.is_ancestor(self) {
                    return None;
                }
                if op.ends_before(self) {
                    p[op.len() - 1] -= 1;
                }
            }

            Operation::MergeNode {
                path: op, position, ..
            } => {
                if op == self || op.ends_before(self) {
                    p[op.len() - 1] = p[op.len() - 1].saturating_sub(1);
                } else if op.is_ancestor(self) {
                    p[op.len() - 1] = p[op.len() - 1].saturating_sub(1);
                    p[op.len()] += position;
                }
            }

            Operation::SplitNode {
                path: op, position, ..
            } => {
                if op.ends_before(self) {
                    p[op.len() - 1] += 1;
                } else if op.is_ancestor(self) && self.0[op.len()] >= *position {
                    p[op.len() - 1] += 1;
                    p[op.len()] -= position;
                }
            }

            Operation::MoveNode {
                path: op,
                new_path: onp,
            } => {
                if op == onp {
                    return Some(self.clone());
                }

                if op.is_ancestor(self) || op == self {
                    let mut moved = onp.0.clone();
                    if op.ends_before(onp) && op.len() < onp.len() {
                        moved[op.len() - 1] -= 1;
                    }
                    moved.extend_from_slice(&self.0[op.len()..]);
                    return Some(Path(moved));
                } else if op.is_sibling(onp) && (onp.is_ancestor(self) || onp == self) {
                    if op.ends_before(self) {
                        p[op.len() - 1] -= 1;
                    } else {
                        p[op.len() - 1] += 1;
                    }
                } else if onp.ends_before(self) || onp == self || onp.is_ancestor(self) {
                    if op.ends_before(self) {
                        p[op.len() - 1] -= 1;
                    }
                    p[onp.len() - 1] += 1;
                } else if op.ends_before(self) {
                    if onp == self {
                        p[onp.len() - 1] += 1;
                    }
                    p[op.len() - 1] -= 1;
                }
            }

            Operation::InsertText { .. }
            | Operation::RemoveText { .. }
            | Operation::SetNode { .. }
            | Operation::SetSelection { .. } => {}
        }

        Some(Path(p))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{index}")?;
        }
        f.write_str("]")
    }
}

impl From<Vec<usize>> for Path {
    fn from(indexes: Vec<usize>) -> Self {
        Self(indexes)
    }
}

impl From<&[usize]> for Path {
    fn from(indexes: &[usize]) -> Self {
        Self(indexes.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Path {
    fn from(indexes: [usize; N]) -> Self {
        Self(indexes.to_vec())
    }
}
