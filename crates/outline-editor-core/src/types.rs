//! Points and ranges within a document tree.
//!
//! These types are framework-agnostic and describe selections as well as the
//! location of edits.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::ops::Operation;
use crate::path::Path;

/// Which side of an insertion at the same offset a point sticks to.
///
/// `Before` keeps the point in front of text inserted at its offset, `After`
/// moves it past the inserted text.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    Before,
    #[default]
    After,
}

/// A position inside a text leaf.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub path: Path,
    /// Character offset in the leaf (NOT byte offset!)
    pub offset: usize,
}

impl Point {
    pub fn new(path: impl Into<Path>, offset: usize) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }

    pub fn compare(&self, other: &Point) -> Ordering {
        match self.path.compare(&other.path) {
            Ordering::Equal => self.offset.cmp(&other.offset),
            unequal => unequal,
        }
    }

    pub fn is_before(&self, other: &Point) -> bool {
        self.compare(other) == Ordering::Less
    }

    /// Where this point ends up after `op`. None when its leaf was removed.
    pub fn transform<T>(&self, op: &Operation<T>, affinity: Affinity) -> Option<Point> {
        let mut path = self.path.clone();
        let mut offset = self.offset;

        match op {
            Operation::InsertText {
                path: op_path,
                offset: at,
                text,
            } => {
                if *op_path == path
                    && (*at < offset || (*at == offset && affinity == Affinity::After))
                {
                    offset += text.chars().count();
                }
            }

            Operation::RemoveText {
                path: op_path,
                offset: at,
                text,
            } => {
                if *op_path == path && *at <= offset {
                    offset -= (offset - at).min(text.chars().count());
                }
            }

            Operation::MergeNode {
                path: op_path,
                position,
                ..
            } => {
                if *op_path == path {
                    offset += position;
                }
                path = path.transform(op)?;
            }

            Operation::SplitNode {
                path: op_path,
                position,
                ..
            } => {
                if *op_path == path {
                    if *position < offset || (*position == offset && affinity == Affinity::After)
                    {
                        offset -= position;
                        path = path.next()?;
                    }
                } else {
                    path = path.transform(op)?;
                }
            }

            _ => {
                path = path.transform(op)?;
            }
        }

        Some(Point { path, offset })
    }
}

/// A selection or edit location. The anchor is where the selection started,
/// the focus is where the cursor is now; they may be in either order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub anchor: Point,
    pub focus: Point,
}

impl Range {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    /// Create a collapsed range (cursor position).
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Check if the range is backwards (focus before anchor).
    pub fn is_backward(&self) -> bool {
        self.focus.is_before(&self.anchor)
    }

    pub fn start(&self) -> &Point {
        if self.is_backward() {
            &self.focus
        } else {
            &self.anchor
        }
    }

    pub fn end(&self) -> &Point {
        if self.is_backward() {
            &self.anchor
        } else {
            &self.focus
        }
    }

    /// Transform both ends. A collapsed range keeps a single affinity so it
    /// stays collapsed; an expanded range shrinks inward.
    pub fn transform<T>(&self, op: &Operation<T>) -> Option<Range> {
        let (anchor_affinity, focus_affinity) = if self.is_collapsed() {
            (Affinity::After, Affinity::After)
        } else if self.is_backward() {
            (Affinity::Before, Affinity::After)
        } else {
            (Affinity::After, Affinity::Before)
        };
        Some(Range {
            anchor: self.anchor.transform(op, anchor_affinity)?,
            focus: self.focus.transform(op, focus_affinity)?,
        })
    }
}
