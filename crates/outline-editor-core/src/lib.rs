//! outline-editor-core: the outline document model without storage or
//! framework dependencies.
//!
//! This crate provides:
//! - `Node<T>` - a copy-on-write tree of typed elements and text leaves,
//!   generic over the leaf `TextBuffer`
//! - `Path`, `Point`, `Range` and their transforms
//! - `Operation<T>` - the nine primitive structural edits, with inverses
//! - `apply` / `apply_all` - the operation applier
//! - the stored JSON form and concept reference extraction

pub mod apply;
pub mod error;
pub mod node;
pub mod ops;
pub mod path;
pub mod references;
pub mod serialize;
pub mod text;
pub mod tree;
pub mod types;

pub use apply::{apply, apply_all, apply_mut};
pub use error::{SerializeError, TreeError};
pub use node::{Element, ElementKind, Marks, Node, PROTECTED_PROPERTIES, Properties, Text};
pub use ops::Operation;
pub use path::Path;
pub use references::{
    ConceptNode, Excerpt, concept_excerpts, concept_nodes, concept_nodes_matching_name,
    referenced_names,
};
pub use serialize::{parse_document, parse_operations, serialize_document, serialize_document_pretty};
pub use smol_str::SmolStr;
pub use text::{EditorRope, TextBuffer, TextContent};
pub use tree::{get, get_mut, leaf, leaf_mut, nodes, parent, string, texts};
pub use types::{Affinity, Point, Range};
