//! Operation applier.
//!
//! Applying an operation is a pure transition from one snapshot to the next.
//! Only the nodes on the edited path are cloned; every other subtree stays
//! shared with the previous snapshot.

use std::sync::Arc;

use tracing::trace;

use crate::error::TreeError;
use crate::node::{Element, Marks, Node, PROTECTED_PROPERTIES, Properties, Text};
use crate::ops::Operation;
use crate::path::Path;
use crate::text::{TextBuffer, TextContent};
use crate::tree::{element_mut, get_mut, leaf_mut};

/// Apply one operation, returning the next snapshot.
pub fn apply<T: TextBuffer + Clone>(
    root: &Node<T>,
    op: &Operation<T>,
) -> Result<Node<T>, TreeError> {
    let mut next = root.clone();
    apply_mut(&mut next, op)?;
    Ok(next)
}

/// Apply operations in order. Stops at the first failing operation; `root`
/// is never modified.
pub fn apply_all<'a, T, I>(root: &Node<T>, ops: I) -> Result<Node<T>, TreeError>
where
    T: TextBuffer + Clone + 'a,
    I: IntoIterator<Item = &'a Operation<T>>,
{
    let mut next = root.clone();
    for (index, op) in ops.into_iter().enumerate() {
        apply_mut(&mut next, op).inspect_err(|e| {
            trace!(index, op = op.name(), error = %e, "operation failed");
        })?;
    }
    Ok(next)
}

/// Apply an operation in place.
///
/// Validation happens before any mutation, so a failed operation leaves
/// `root` as it was.
pub fn apply_mut<T: TextBuffer + Clone>(
    root: &mut Node<T>,
    op: &Operation<T>,
) -> Result<(), TreeError> {
    trace!(op = op.name(), path = ?op.path(), "apply");
    match op {
        Operation::InsertText { path, offset, text } => {
            let leaf = leaf_mut(root, path)?;
            check_offset(path, *offset, leaf.len_chars())?;
            if !text.is_empty() {
                leaf.content.promote().insert(*offset, text);
            }
        }

        Operation::RemoveText { path, offset, text } => {
            let leaf = leaf_mut(root, path)?;
            let count = text.chars().count();
            let end = offset.checked_add(count).ok_or_else(|| TreeError::OffsetOutOfRange {
                path: path.clone(),
                offset: *offset,
                len: leaf.len_chars(),
            })?;
            check_offset(path, end, leaf.len_chars())?;
            if count > 0 {
                leaf.content.promote().delete(*offset..end);
            }
        }

        Operation::InsertNode { path, node } => {
            let (parent_path, index) = path.split_last().ok_or(TreeError::RootMutation)?;
            let parent = element_mut(root, &parent_path, path)?;
            if index > parent.children.len() {
                return Err(TreeError::PathNotFound { path: path.clone() });
            }
            parent.children.insert(index, Arc::new(node.clone()));
        }

        Operation::RemoveNode { path, .. } => {
            remove_child(root, path)?;
        }

        Operation::SetNode {
            path,
            new_properties,
            ..
        } => set_node(root, path, new_properties)?,

        Operation::SplitNode {
            path,
            position,
            properties,
        } => split_node(root, path, *position, properties)?,

        Operation::MergeNode { path, .. } => merge_node(root, path)?,

        Operation::MoveNode { path, new_path } => {
            if path == new_path {
                return Ok(());
            }
            if path.is_ancestor(new_path) {
                return Err(TreeError::SelfContainment {
                    path: path.clone(),
                    new_path: new_path.clone(),
                });
            }
            let destination = path
                .transform(op)
                .ok_or_else(|| TreeError::PathNotFound { path: path.clone() })?;
            let (dest_parent, dest_index) =
                destination.split_last().ok_or(TreeError::RootMutation)?;

            // Resolve the destination before detaching anything.
            let mut check = root.clone();
            let node = remove_child(&mut check, path)?;
            let parent = element_mut(&mut check, &dest_parent, new_path)?;
            if dest_index > parent.children.len() {
                return Err(TreeError::PathNotFound {
                    path: new_path.clone(),
                });
            }
            parent.children.insert(dest_index, node);
            *root = check;
        }

        Operation::SetSelection { .. } => {}
    }
    Ok(())
}

fn check_offset(path: &Path, offset: usize, len: usize) -> Result<(), TreeError> {
    if offset > len {
        return Err(TreeError::OffsetOutOfRange {
            path: path.clone(),
            offset,
            len,
        });
    }
    Ok(())
}

fn remove_child<T: TextBuffer + Clone>(
    root: &mut Node<T>,
    path: &Path,
) -> Result<Arc<Node<T>>, TreeError> {
    let (parent_path, index) = path.split_last().ok_or(TreeError::RootMutation)?;
    let parent = element_mut(root, &parent_path, path)?;
    if index >= parent.children.len() {
        return Err(TreeError::PathNotFound { path: path.clone() });
    }
    Ok(parent.children.remove(index))
}

fn set_node<T: TextBuffer + Clone>(
    root: &mut Node<T>,
    path: &Path,
    updates: &Properties,
) -> Result<(), TreeError> {
    if path.is_root() {
        return Err(TreeError::RootMutation);
    }
    if let Some(key) = updates
        .keys()
        .find(|key| PROTECTED_PROPERTIES.contains(&key.as_str()))
    {
        return Err(TreeError::ProtectedProperty { key: key.clone() });
    }
    match get_mut(root, path)? {
        Node::Element(element) => {
            let mut updated = element.clone();
            updated.set_properties(updates)?;
            *element = updated;
        }
        Node::Text(text) => text.marks = merged_marks(text.marks, updates)?,
    }
    Ok(())
}

fn merged_marks(mut marks: Marks, updates: &Properties) -> Result<Marks, TreeError> {
    for (name, value) in updates {
        marks.set(name, value)?;
    }
    Ok(marks)
}

fn split_plain(text: &mut String, position: usize) -> String {
    let byte = text
        .char_indices()
        .nth(position)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len());
    text.split_off(byte)
}

fn split_node<T: TextBuffer + Clone>(
    root: &mut Node<T>,
    path: &Path,
    position: usize,
    properties: &Properties,
) -> Result<(), TreeError> {
    let (parent_path, index) = path.split_last().ok_or(TreeError::RootMutation)?;
    let parent = element_mut(root, &parent_path, path)?;
    let child = parent
        .children
        .get_mut(index)
        .ok_or_else(|| TreeError::PathNotFound { path: path.clone() })?;

    let sibling = match Arc::make_mut(child) {
        Node::Text(text) => {
            check_offset(path, position, text.len_chars())?;
            let marks = merged_marks(text.marks, properties)?;
            let tail = match &mut text.content {
                TextContent::Plain(plain) => TextContent::Plain(split_plain(plain, position)),
                TextContent::Sequence(buffer) => TextContent::Sequence(buffer.split_off(position)),
            };
            Node::Text(Text {
                content: tail,
                marks,
            })
        }
        Node::Element(element) => {
            check_offset(path, position, element.children.len())?;
            let mut sibling = Element {
                kind: element.kind,
                properties: element.properties.clone(),
                children: Vec::new(),
            };
            sibling.set_properties(properties)?;
            sibling.children = element.children.split_off(position);
            Node::Element(sibling)
        }
    };
    parent.children.insert(index + 1, Arc::new(sibling));
    Ok(())
}

fn merge_node<T: TextBuffer + Clone>(root: &mut Node<T>, path: &Path) -> Result<(), TreeError> {
    let (parent_path, index) = path.split_last().ok_or(TreeError::RootMutation)?;
    let parent = element_mut(root, &parent_path, path)?;
    if index == 0 || index >= parent.children.len() {
        return Err(TreeError::PathNotFound { path: path.clone() });
    }
    let compatible = matches!(
        (parent.children[index - 1].as_ref(), parent.children[index].as_ref()),
        (Node::Text(_), Node::Text(_)) | (Node::Element(_), Node::Element(_))
    );
    if !compatible {
        return Err(TreeError::IncompatibleMerge { path: path.clone() });
    }

    let later = Arc::unwrap_or_clone(parent.children.remove(index));
    match (Arc::make_mut(&mut parent.children[index - 1]), later) {
        (Node::Text(previous), Node::Text(later)) => {
            let appended = later.content.to_text();
            if !appended.is_empty() {
                previous.content.promote().push(&appended);
            }
        }
        (Node::Element(previous), Node::Element(later)) => {
            previous.children.extend(later.children);
        }
        _ => unreachable!("merge compatibility checked above"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::node::ElementKind;
    use crate::text::EditorRope;
    use crate::tree::{get, leaf, string};

    type Op = Operation<EditorRope>;

    fn document() -> Node<EditorRope> {
        Node::root(vec![
            Node::paragraph("abcdef"),
            Node::element(
                ElementKind::BulletedList,
                vec![
                    Node::element(ElementKind::ListItem, vec![Node::text("one")]),
                    Node::element(ElementKind::ListItem, vec![Node::text("two")]),
                ],
            ),
        ])
    }

    #[test]
    fn test_insert_and_remove_text() {
        let doc = document();
        let inserted = apply(
            &doc,
            &Op::InsertText {
                path: Path::from([0, 0]),
                offset: 3,
                text: "XY".into(),
            },
        )
        .unwrap();
        assert_eq!(leaf(&inserted, &Path::from([0, 0])).unwrap().text(), "abcXYdef");
        assert!(leaf(&inserted, &Path::from([0, 0])).unwrap().content.is_promoted());
        // The previous snapshot keeps its plain leaf.
        assert_eq!(leaf(&doc, &Path::from([0, 0])).unwrap().text(), "abcdef");
        assert!(Arc::ptr_eq(&doc.children()[1], &inserted.children()[1]));

        let removed = apply(
            &inserted,
            &Op::RemoveText {
                path: Path::from([0, 0]),
                offset: 3,
                text: "XY".into(),
            },
        )
        .unwrap();
        assert_eq!(removed, doc);
    }

    #[test]
    fn test_text_offset_out_of_range() {
        let err = apply(
            &document(),
            &Op::InsertText {
                path: Path::from([0, 0]),
                offset: 7,
                text: "x".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TreeError::OffsetOutOfRange { offset: 7, len: 6, .. }));
    }

    #[test]
    fn test_remove_text_at_huge_offset_is_an_error() {
        let err = apply(
            &document(),
            &Op::RemoveText {
                path: Path::from([0, 0]),
                offset: usize::MAX,
                text: "a".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TreeError::OffsetOutOfRange { offset: usize::MAX, len: 6, .. }
        ));
    }

    #[test]
    fn test_split_then_merge_restores_text() {
        let doc = document();
        let split = Op::SplitNode {
            path: Path::from([0, 0]),
            position: 3,
            properties: Properties::new(),
        };
        let after_split = apply(&doc, &split).unwrap();
        assert_eq!(leaf(&after_split, &Path::from([0, 0])).unwrap().text(), "abc");
        assert_eq!(leaf(&after_split, &Path::from([0, 1])).unwrap().text(), "def");

        let merge = split.inverse().unwrap();
        let restored = apply(&after_split, &merge).unwrap();
        assert_eq!(restored, doc);
        assert_eq!(string(&restored), string(&doc));
    }

    #[test]
    fn test_split_element_keeps_kind_and_overrides_properties() {
        let mut properties = Properties::new();
        properties.insert("checked".into(), json!(true));
        let doc = apply(
            &document(),
            &Op::SplitNode {
                path: Path::from([1]),
                position: 1,
                properties,
            },
        )
        .unwrap();
        assert_eq!(doc.children().len(), 3);
        let tail = get(&doc, &Path::from([2])).unwrap().as_element().unwrap();
        assert_eq!(tail.kind, ElementKind::BulletedList);
        assert_eq!(tail.property("checked"), Some(&json!(true)));
        assert_eq!(string(&doc.children()[2]), "two");

        let merged = apply(
            &doc,
            &Op::MergeNode {
                path: Path::from([2]),
                position: 1,
                properties: Properties::new(),
            },
        )
        .unwrap();
        assert_eq!(string(&merged.children()[1]), "onetwo");
        assert_eq!(merged.children()[1].children().len(), 2);
    }

    #[test]
    fn test_split_text_merges_marks() {
        let mut properties = Properties::new();
        properties.insert("bold".into(), json!(true));
        let doc = apply(
            &document(),
            &Op::SplitNode {
                path: Path::from([0, 0]),
                position: 2,
                properties,
            },
        )
        .unwrap();
        assert!(!leaf(&doc, &Path::from([0, 0])).unwrap().marks.bold);
        assert!(leaf(&doc, &Path::from([0, 1])).unwrap().marks.bold);
    }

    #[test]
    fn test_incompatible_merge() {
        let doc: Node<EditorRope> = Node::root(vec![Node::element(
            ElementKind::Paragraph,
            vec![Node::text("a"), Node::concept("X")],
        )]);
        let err = apply(
            &doc,
            &Op::MergeNode {
                path: Path::from([0, 1]),
                position: 1,
                properties: Properties::new(),
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            TreeError::IncompatibleMerge {
                path: Path::from([0, 1])
            }
        );
    }

    #[test]
    fn test_move_into_own_descendant_is_rejected() {
        let doc = document();
        let err = apply(
            &doc,
            &Op::MoveNode {
                path: Path::from([1, 0]),
                new_path: Path::from([1, 0, 0]),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TreeError::SelfContainment { .. }));
    }

    #[test]
    fn test_move_between_parents() {
        let doc = document();
        let op = Op::MoveNode {
            path: Path::from([1, 1]),
            new_path: Path::from([0]),
        };
        let moved = apply(&doc, &op).unwrap();
        assert_eq!(moved.children().len(), 3);
        assert_eq!(moved.children()[0].kind(), Some(ElementKind::ListItem));
        assert_eq!(string(&moved.children()[0]), "two");
        assert_eq!(moved.children()[2].children().len(), 1);

        let back = apply(&moved, &op.inverse().unwrap()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_move_to_same_path_is_noop() {
        let doc = document();
        let moved = apply(
            &doc,
            &Op::MoveNode {
                path: Path::from([1, 0]),
                new_path: Path::from([1, 0]),
            },
        )
        .unwrap();
        assert_eq!(moved, doc);
    }

    #[test]
    fn test_set_node_on_root_is_rejected() {
        let mut props = Properties::new();
        props.insert("type".into(), json!("paragraph"));
        let err = apply(
            &document(),
            &Op::SetNode {
                path: Path::root(),
                properties: Properties::new(),
                new_properties: props,
            },
        )
        .unwrap_err();
        assert_eq!(err, TreeError::RootMutation);
    }

    #[test]
    fn test_set_node_protected_property() {
        let mut props = Properties::new();
        props.insert("text".into(), json!("sneaky"));
        let err = apply(
            &document(),
            &Op::SetNode {
                path: Path::from([0, 0]),
                properties: Properties::new(),
                new_properties: props,
            },
        )
        .unwrap_err();
        assert_eq!(err, TreeError::ProtectedProperty { key: "text".into() });
    }

    #[test]
    fn test_set_node_changes_kind_and_marks() {
        let mut kind = Properties::new();
        kind.insert("type".into(), json!("heading-one"));
        let mut bold = Properties::new();
        bold.insert("bold".into(), json!(true));
        let ops = [
            Op::SetNode {
                path: Path::from([0]),
                properties: Properties::new(),
                new_properties: kind,
            },
            Op::SetNode {
                path: Path::from([0, 0]),
                properties: Properties::new(),
                new_properties: bold,
            },
        ];
        let doc = apply_all(&document(), &ops).unwrap();
        assert_eq!(doc.children()[0].kind(), Some(ElementKind::HeadingOne));
        assert!(leaf(&doc, &Path::from([0, 0])).unwrap().marks.bold);
    }

    #[test]
    fn test_apply_all_stops_at_first_error() {
        let doc = document();
        let ops = [
            Op::InsertText {
                path: Path::from([0, 0]),
                offset: 0,
                text: ">".into(),
            },
            Op::RemoveNode {
                path: Path::from([9]),
                node: None,
            },
            Op::InsertText {
                path: Path::from([0, 0]),
                offset: 0,
                text: ">".into(),
            },
        ];
        let err = apply_all(&doc, &ops).unwrap_err();
        assert!(matches!(err, TreeError::PathNotFound { .. }));
        assert_eq!(leaf(&doc, &Path::from([0, 0])).unwrap().text(), "abcdef");
    }

    #[test]
    fn test_insert_and_remove_node() {
        let doc = document();
        let node = Node::paragraph("new");
        let inserted = apply(
            &doc,
            &Op::InsertNode {
                path: Path::from([1]),
                node: node.clone(),
            },
        )
        .unwrap();
        assert_eq!(inserted.children().len(), 3);
        assert_eq!(string(&inserted.children()[1]), "new");

        let removed = apply(
            &inserted,
            &Op::RemoveNode {
                path: Path::from([1]),
                node: Some(node),
            },
        )
        .unwrap();
        assert_eq!(removed, doc);
    }

    #[test]
    fn test_set_selection_is_noop() {
        let doc = document();
        let next = apply(
            &doc,
            &Op::SetSelection {
                properties: None,
                new_properties: None,
            },
        )
        .unwrap();
        assert_eq!(next, doc);
    }
}
