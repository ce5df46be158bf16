//! Concept references within a document.
//!
//! A concept reference is an inline element naming another document. The set
//! of names a document references is derived on demand and never stored in
//! the tree itself.

use std::collections::BTreeSet;

use smol_str::SmolStr;

use crate::node::{Element, ElementKind, Node};
use crate::path::Path;
use crate::text::TextBuffer;
use crate::tree::{elements, enclosing_block, string};

/// A concept reference element and where it sits in the tree.
#[derive(Debug, Clone)]
pub struct ConceptNode<'a, T> {
    pub path: Path,
    pub element: &'a Element<T>,
}

impl<T> ConceptNode<'_, T> {
    pub fn name(&self) -> Option<&str> {
        self.element.name()
    }
}

/// All concept reference elements in document order.
pub fn concept_nodes<T>(root: &Node<T>) -> Vec<ConceptNode<'_, T>> {
    elements(root)
        .filter(|(_, element)| element.kind == ElementKind::ConceptReference)
        .map(|(path, element)| ConceptNode { path, element })
        .collect()
}

/// Concept references whose `name` is exactly `name`.
pub fn concept_nodes_matching_name<'a, T>(root: &'a Node<T>, name: &str) -> Vec<ConceptNode<'a, T>> {
    concept_nodes(root)
        .into_iter()
        .filter(|found| found.name() == Some(name))
        .collect()
}

/// The distinct names a document references, sorted.
pub fn referenced_names<T>(root: &Node<T>) -> BTreeSet<SmolStr> {
    concept_nodes(root)
        .into_iter()
        .filter_map(|found| found.element.name_smol())
        .collect()
}

/// Text of a block that mentions a concept, for previews.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub path: Path,
    pub text: String,
}

/// One excerpt per block that mentions `name`, in document order.
pub fn concept_excerpts<T: TextBuffer>(root: &Node<T>, name: &str) -> Vec<Excerpt> {
    let mut excerpts: Vec<Excerpt> = Vec::new();
    for found in concept_nodes_matching_name(root, name) {
        let Some((path, block)) = found
            .path
            .parent()
            .and_then(|parent| enclosing_block(root, &parent))
        else {
            continue;
        };
        if excerpts.iter().any(|excerpt| excerpt.path == path) {
            continue;
        }
        let text = block
            .children
            .iter()
            .map(|child| match child.as_element() {
                Some(element) if element.kind == ElementKind::ConceptReference => {
                    element.name().unwrap_or_default().to_string()
                }
                _ => string(child),
            })
            .collect::<String>();
        excerpts.push(Excerpt { path, text });
    }
    excerpts
}
