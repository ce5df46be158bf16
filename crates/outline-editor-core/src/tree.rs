//! Tree navigation: resolving paths to nodes and walking a document.

use std::sync::Arc;

use crate::error::TreeError;
use crate::node::{Element, Node, Text};
use crate::path::Path;
use crate::text::TextBuffer;

/// The node at `path`.
pub fn get<'a, T>(root: &'a Node<T>, path: &Path) -> Result<&'a Node<T>, TreeError> {
    let mut node = root;
    for index in path.iter() {
        node = match node {
            Node::Element(element) => element
                .children
                .get(index)
                .map(Arc::as_ref)
                .ok_or_else(|| TreeError::PathNotFound { path: path.clone() })?,
            Node::Text(_) => return Err(TreeError::PathNotFound { path: path.clone() }),
        };
    }
    Ok(node)
}

/// The element containing the node at `path`.
pub fn parent<'a, T>(root: &'a Node<T>, path: &Path) -> Result<&'a Element<T>, TreeError> {
    let parent_path = path
        .parent()
        .ok_or_else(|| TreeError::PathNotFound { path: path.clone() })?;
    match get(root, &parent_path)? {
        Node::Element(element) => Ok(element),
        Node::Text(_) => Err(TreeError::InvalidParent { path: path.clone() }),
    }
}

/// The text leaf at `path`.
pub fn leaf<'a, T>(root: &'a Node<T>, path: &Path) -> Result<&'a Text<T>, TreeError> {
    match get(root, path)? {
        Node::Text(text) => Ok(text),
        Node::Element(_) => Err(TreeError::NotALeaf { path: path.clone() }),
    }
}

/// Mutable access to the node at `path`, cloning every shared node on the
/// way down so other snapshots never observe the change.
pub fn get_mut<'a, T: Clone>(
    root: &'a mut Node<T>,
    path: &Path,
) -> Result<&'a mut Node<T>, TreeError> {
    let mut node = root;
    for index in path.iter() {
        node = match node {
            Node::Element(element) => match element.children.get_mut(index) {
                Some(child) => Arc::make_mut(child),
                None => return Err(TreeError::PathNotFound { path: path.clone() }),
            },
            Node::Text(_) => return Err(TreeError::PathNotFound { path: path.clone() }),
        };
    }
    Ok(node)
}

/// Mutable access to the element at `path`. `child_path` is reported when the
/// element turns out to be a text leaf.
pub(crate) fn element_mut<'a, T: Clone>(
    root: &'a mut Node<T>,
    path: &Path,
    child_path: &Path,
) -> Result<&'a mut Element<T>, TreeError> {
    match get_mut(root, path)? {
        Node::Element(element) => Ok(element),
        Node::Text(_) => Err(TreeError::InvalidParent {
            path: child_path.clone(),
        }),
    }
}

pub fn leaf_mut<'a, T: Clone>(
    root: &'a mut Node<T>,
    path: &Path,
) -> Result<&'a mut Text<T>, TreeError> {
    match get_mut(root, path)? {
        Node::Text(text) => Ok(text),
        Node::Element(_) => Err(TreeError::NotALeaf { path: path.clone() }),
    }
}

/// Concatenated text content of a node.
pub fn string<T: TextBuffer>(node: &Node<T>) -> String {
    match node {
        Node::Text(text) => text.text(),
        Node::Element(element) => element
            .children
            .iter()
            .map(|child| string(child))
            .collect(),
    }
}

/// Depth-first, document-order iterator over `(path, node)` pairs, starting
/// with the root itself.
pub struct Descendants<'a, T> {
    stack: Vec<(Path, &'a Node<T>)>,
}

impl<'a, T> Iterator for Descendants<'a, T> {
    type Item = (Path, &'a Node<T>);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, node) = self.stack.pop()?;
        let children = node.children();
        for index in (0..children.len()).rev() {
            self.stack.push((path.child(index), children[index].as_ref()));
        }
        Some((path, node))
    }
}

pub fn nodes<T>(root: &Node<T>) -> Descendants<'_, T> {
    Descendants {
        stack: vec![(Path::root(), root)],
    }
}

/// Every element with its path, in document order.
pub fn elements<T>(root: &Node<T>) -> impl Iterator<Item = (Path, &Element<T>)> {
    nodes(root).filter_map(|(path, node)| node.as_element().map(|element| (path, element)))
}

/// Every text leaf with its path, in document order.
pub fn texts<T>(root: &Node<T>) -> impl Iterator<Item = (Path, &Text<T>)> {
    nodes(root).filter_map(|(path, node)| node.as_text().map(|text| (path, text)))
}

/// The innermost block element containing `path` (or the node itself).
pub fn enclosing_block<'a, T>(root: &'a Node<T>, path: &Path) -> Option<(Path, &'a Element<T>)> {
    let mut candidate = Some(path.clone());
    while let Some(current) = candidate {
        if let Ok(Node::Element(element)) = get(root, &current) {
            if element.kind.is_block() {
                return Some((current, element));
            }
        }
        candidate = current.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ElementKind;
    use crate::text::EditorRope;

    fn document() -> Node<EditorRope> {
        Node::root(vec![
            Node::element(
                ElementKind::Paragraph,
                vec![Node::text("one "), Node::concept("X"), Node::text(" two")],
            ),
            Node::element(
                ElementKind::BulletedList,
                vec![Node::element(ElementKind::ListItem, vec![Node::text("item")])],
            ),
        ])
    }

    #[test]
    fn test_get() {
        let doc = document();
        assert_eq!(get(&doc, &Path::from([1, 0])).unwrap().kind(), Some(ElementKind::ListItem));
        assert_eq!(
            get(&doc, &Path::from([5])).unwrap_err(),
            TreeError::PathNotFound {
                path: Path::from([5])
            }
        );
        // Text leaves have no children.
        assert!(matches!(
            get(&doc, &Path::from([0, 0, 0])),
            Err(TreeError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_parent() {
        let doc = document();
        assert_eq!(parent(&doc, &Path::from([0, 2])).unwrap().kind, ElementKind::Paragraph);
        assert!(matches!(
            parent(&doc, &Path::root()),
            Err(TreeError::PathNotFound { .. })
        ));
        assert!(matches!(
            parent(&doc, &Path::from([0, 0, 0])),
            Err(TreeError::InvalidParent { .. })
        ));
    }

    #[test]
    fn test_leaf() {
        let doc = document();
        assert_eq!(leaf(&doc, &Path::from([1, 0, 0])).unwrap().text(), "item");
        assert_eq!(
            leaf(&doc, &Path::from([1])).unwrap_err(),
            TreeError::NotALeaf {
                path: Path::from([1])
            }
        );
    }

    #[test]
    fn test_string_and_texts() {
        let doc = document();
        assert_eq!(string(&doc), "one  twoitem");
        let paths: Vec<Path> = texts(&doc).map(|(path, _)| path).collect();
        assert_eq!(
            paths,
            vec![
                Path::from([0, 0]),
                Path::from([0, 1, 0]),
                Path::from([0, 2]),
                Path::from([1, 0, 0]),
            ]
        );
    }

    #[test]
    fn test_enclosing_block() {
        let doc = document();
        let (path, element) = enclosing_block(&doc, &Path::from([0, 1, 0])).unwrap();
        assert_eq!(path, Path::from([0]));
        assert_eq!(element.kind, ElementKind::Paragraph);
    }

    #[test]
    fn test_get_mut_leaves_other_snapshots_untouched() {
        let original = document();
        let mut edited = original.clone();
        if let Node::Text(text) = get_mut(&mut edited, &Path::from([1, 0, 0])).unwrap() {
            text.content.promote().push("!");
        }
        assert_eq!(leaf(&original, &Path::from([1, 0, 0])).unwrap().text(), "item");
        assert_eq!(leaf(&edited, &Path::from([1, 0, 0])).unwrap().text(), "item!");
        // The untouched paragraph is still shared between both snapshots.
        assert!(Arc::ptr_eq(&original.children()[0], &edited.children()[0]));
    }
}
