//! Primitive structural edit operations.
//!
//! Every mutation of a document is expressed as a sequence of these nine
//! operations. Each variant carries enough data to apply it and to build its
//! inverse, so an operation log can be replayed forwards or undone.

use serde::{Deserialize, Serialize};

use crate::node::{Node, Properties};
use crate::path::Path;
use crate::text::TextBuffer;
use crate::types::Range;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase",
    bound(serialize = "T: TextBuffer", deserialize = "T: TextBuffer")
)]
pub enum Operation<T> {
    InsertText {
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        path: Path,
        offset: usize,
        text: String,
    },
    InsertNode {
        path: Path,
        node: Node<T>,
    },
    /// `node` is the removed subtree, needed only for inversion.
    RemoveNode {
        path: Path,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node: Option<Node<T>>,
    },
    /// Merge the node at `path` into its previous sibling. `position` is the
    /// length (chars or children) of that sibling before the merge.
    MergeNode {
        path: Path,
        #[serde(default)]
        position: usize,
        #[serde(default)]
        properties: Properties,
    },
    SplitNode {
        path: Path,
        position: usize,
        #[serde(default)]
        properties: Properties,
    },
    MoveNode {
        path: Path,
        new_path: Path,
    },
    /// `properties` holds the previous values of the keys in
    /// `new_properties`, needed only for inversion.
    SetNode {
        path: Path,
        #[serde(default)]
        properties: Properties,
        new_properties: Properties,
    },
    SetSelection {
        #[serde(default)]
        properties: Option<Range>,
        #[serde(default)]
        new_properties: Option<Range>,
    },
}

impl<T> Operation<T> {
    /// Wire name of the variant, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::InsertText { .. } => "insert_text",
            Operation::RemoveText { .. } => "remove_text",
            Operation::InsertNode { .. } => "insert_node",
            Operation::RemoveNode { .. } => "remove_node",
            Operation::MergeNode { .. } => "merge_node",
            Operation::SplitNode { .. } => "split_node",
            Operation::MoveNode { .. } => "move_node",
            Operation::SetNode { .. } => "set_node",
            Operation::SetSelection { .. } => "set_selection",
        }
    }

    /// The path the operation targets. None for selection changes.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Operation::InsertText { path, .. }
            | Operation::RemoveText { path, .. }
            | Operation::InsertNode { path, .. }
            | Operation::RemoveNode { path, .. }
            | Operation::MergeNode { path, .. }
            | Operation::SplitNode { path, .. }
            | Operation::MoveNode { path, .. }
            | Operation::SetNode { path, .. } => Some(path),
            Operation::SetSelection { .. } => None,
        }
    }

    pub fn is_text_operation(&self) -> bool {
        matches!(
            self,
            Operation::InsertText { .. } | Operation::RemoveText { .. }
        )
    }

    /// Selection changes never touch the persisted tree.
    pub fn changes_document(&self) -> bool {
        !matches!(self, Operation::SetSelection { .. })
    }
}

impl<T: Clone> Operation<T> {
    /// The operation that undoes this one.
    ///
    /// Returns None for a `remove_node` that does not carry the removed node,
    /// or for a `move_node` whose inverse cannot be located.
    pub fn inverse(&self) -> Option<Operation<T>> {
        let inverse = match self {
            Operation::InsertText { path, offset, text } => Operation::RemoveText {
                path: path.clone(),
                offset: *offset,
                text: text.clone(),
            },
            Operation::RemoveText { path, offset, text } => Operation::InsertText {
                path: path.clone(),
                offset: *offset,
                text: text.clone(),
            },
            Operation::InsertNode { path, node } => Operation::RemoveNode {
                path: path.clone(),
                node: Some(node.clone()),
            },
            Operation::RemoveNode { path, node } => Operation::InsertNode {
                path: path.clone(),
                node: node.clone()?,
            },
            Operation::MergeNode {
                path,
                position,
                properties,
            } => Operation::SplitNode {
                path: path.previous()?,
                position: *position,
                properties: properties.clone(),
            },
            Operation::SplitNode {
                path,
                position,
                properties,
            } => Operation::MergeNode {
                path: path.next()?,
                position: *position,
                properties: properties.clone(),
            },
            Operation::MoveNode { path, new_path } => {
                if path == new_path {
                    self.clone()
                } else if path.is_sibling(new_path) {
                    Operation::MoveNode {
                        path: new_path.clone(),
                        new_path: path.clone(),
                    }
                } else {
                    // The node now lives at the transform of its old path,
                    // and must return to where its old next sibling ended up.
                    Operation::MoveNode {
                        path: path.transform(self)?,
                        new_path: path.next()?.transform(self)?,
                    }
                }
            }
            Operation::SetNode {
                path,
                properties,
                new_properties,
            } => Operation::SetNode {
                path: path.clone(),
                properties: new_properties.clone(),
                new_properties: properties.clone(),
            },
            Operation::SetSelection {
                properties,
                new_properties,
            } => Operation::SetSelection {
                properties: new_properties.clone(),
                new_properties: properties.clone(),
            },
        };
        Some(inverse)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::text::EditorRope;

    type Op = Operation<EditorRope>;

    #[test]
    fn test_wire_format() {
        let op: Op = serde_json::from_value(json!({
            "type": "move_node",
            "path": [0, 1],
            "newPath": [2]
        }))
        .unwrap();
        assert!(matches!(
            &op,
            Operation::MoveNode { path, new_path }
                if *path == Path::from([0, 1]) && *new_path == Path::from([2])
        ));

        let value = serde_json::to_value(&Op::SplitNode {
            path: Path::from([0, 0]),
            position: 3,
            properties: Properties::new(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "split_node", "path": [0, 0], "position": 3, "properties": {}})
        );
    }

    #[test]
    fn test_insert_node_carries_serialized_node() {
        let op: Op = serde_json::from_value(json!({
            "type": "insert_node",
            "path": [1],
            "node": {"type": "paragraph", "children": [{"text": "hi", "bold": true}]}
        }))
        .unwrap();
        let Operation::InsertNode { node, .. } = op else {
            panic!("expected insert_node");
        };
        assert_eq!(node.kind(), Some(crate::node::ElementKind::Paragraph));
    }

    #[test]
    fn test_inverse_pairs() {
        let split: Op = Operation::SplitNode {
            path: Path::from([0, 0]),
            position: 3,
            properties: Properties::new(),
        };
        let merge = split.inverse().unwrap();
        assert!(matches!(
            &merge,
            Operation::MergeNode { path, position: 3, .. } if *path == Path::from([0, 1])
        ));
        assert!(matches!(
            merge.inverse().unwrap(),
            Operation::SplitNode { path, position: 3, .. } if path == Path::from([0, 0])
        ));

        let insert: Op = Operation::InsertText {
            path: Path::from([0, 0]),
            offset: 1,
            text: "b".into(),
        };
        assert!(matches!(insert.inverse(), Some(Operation::RemoveText { offset: 1, .. })));
    }

    #[test]
    fn test_inverse_of_bare_remove_is_unknown() {
        let remove: Op = Operation::RemoveNode {
            path: Path::from([0]),
            node: None,
        };
        assert!(remove.inverse().is_none());
    }

    #[test]
    fn test_inverse_move_across_parents() {
        let op: Op = Operation::MoveNode {
            path: Path::from([0, 1]),
            new_path: Path::from([1, 0]),
        };
        let Some(Operation::MoveNode { path, new_path }) = op.inverse() else {
            panic!("expected move_node");
        };
        assert_eq!(path, Path::from([1, 0]));
        assert_eq!(new_path, Path::from([0, 1]));
    }

    #[test]
    fn test_selection_does_not_change_document() {
        let op: Op = Operation::SetSelection {
            properties: None,
            new_properties: None,
        };
        assert!(!op.changes_document());
        assert!(op.path().is_none());
    }
}
