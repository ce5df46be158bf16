//! Error types for tree navigation, operation application and serialization.

use miette::Diagnostic;
use thiserror::Error;

use crate::path::Path;

/// Invariant violations raised while resolving paths or applying operations.
///
/// None of these are expected when operations are generated against the
/// snapshot they are applied to. Callers should abort the edit and fall back
/// to the last good snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[non_exhaustive]
pub enum TreeError {
    #[error("no node at path {path}")]
    #[diagnostic(
        code(tree::path_not_found),
        help("the operation was probably generated against a different snapshot")
    )]
    PathNotFound { path: Path },

    #[error("node at path {path} is an element, not a text leaf")]
    #[diagnostic(code(tree::not_a_leaf))]
    NotALeaf { path: Path },

    #[error("parent of path {path} is a text leaf and cannot have children")]
    #[diagnostic(code(tree::invalid_parent))]
    InvalidParent { path: Path },

    #[error("cannot merge node at {path} into a sibling of a different kind")]
    #[diagnostic(
        code(tree::incompatible_merge),
        help("only text-into-text and element-into-element merges are legal")
    )]
    IncompatibleMerge { path: Path },

    #[error("cannot move node at {path} inside itself (to {new_path})")]
    #[diagnostic(code(tree::self_containment))]
    SelfContainment { path: Path, new_path: Path },

    #[error("the document root cannot be modified")]
    #[diagnostic(code(tree::root_mutation))]
    RootMutation,

    #[error("property `{key}` cannot be set directly")]
    #[diagnostic(
        code(tree::protected_property),
        help("use node or text operations to change `children` and `text`")
    )]
    ProtectedProperty { key: String },

    #[error("offset {offset} is out of range for node at {path} (length {len})")]
    #[diagnostic(code(tree::offset_out_of_range))]
    OffsetOutOfRange { path: Path, offset: usize, len: usize },

    #[error("invalid value for property `{key}`: {message}")]
    #[diagnostic(code(tree::invalid_property))]
    InvalidProperty { key: String, message: String },
}

/// Errors converting between the in-memory tree and its serialized form.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum SerializeError {
    #[error("malformed document JSON")]
    #[diagnostic(code(serialize::json))]
    Json(#[from] serde_json::Error),

    #[error("expected {expected}, found {found}")]
    #[diagnostic(code(serialize::unexpected_value))]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },

    #[error("element node is missing its `{field}` field")]
    #[diagnostic(code(serialize::missing_field))]
    MissingField { field: &'static str },

    #[error("unknown element type `{value}`")]
    #[diagnostic(
        code(serialize::unknown_element_type),
        help("the document was written by a newer editor or is corrupt")
    )]
    UnknownElementType { value: String },
}
