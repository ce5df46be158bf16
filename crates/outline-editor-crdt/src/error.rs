//! Error types for CRDT documents, persistence and sessions.

use miette::Diagnostic;
use outline_editor_core::{Path, SerializeError, TreeError};
use thiserror::Error;

/// Errors that can occur during CRDT and session operations.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum CrdtError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Serialization(#[from] SerializeError),

    /// Loro CRDT error.
    #[error("loro error: {0}")]
    #[diagnostic(code(crdt::loro))]
    Loro(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persistence(PersistenceError),

    /// The document text was saved but some backlink updates failed.
    #[error("{failed} of {total} reference updates failed")]
    #[diagnostic(
        code(crdt::partial_reference_update),
        help("the document itself was saved; the reference diff is retried with the next save")
    )]
    PartialReferenceUpdate { failed: usize, total: usize },

    /// Two replicas disagree on tree structure at `path`.
    #[error("replica structure diverged at {path}")]
    #[diagnostic(
        code(crdt::structure_diverged),
        help("only text edits merge; replicas must agree on structure first")
    )]
    StructureDiverged { path: Path },

    #[error("no document is open")]
    #[diagnostic(code(crdt::no_document))]
    NoDocument,

    #[error("opening {address} was superseded by a later open")]
    #[diagnostic(code(crdt::superseded))]
    Superseded { address: String },

    #[error("the document session has shut down")]
    #[diagnostic(code(crdt::session_closed))]
    SessionClosed,
}

impl From<loro::LoroError> for CrdtError {
    fn from(e: loro::LoroError) -> Self {
        CrdtError::Loro(e.to_string())
    }
}

impl From<PersistenceError> for CrdtError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::PartialReferenceUpdate { failed, total } => {
                CrdtError::PartialReferenceUpdate { failed, total }
            }
            other => CrdtError::Persistence(other),
        }
    }
}

/// Errors surfaced by document stores, backlink indexes and backup sinks.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
#[non_exhaustive]
pub enum PersistenceError {
    #[error("document {address} not found")]
    #[diagnostic(code(persistence::not_found))]
    NotFound { address: String },

    #[error("storage backend failed: {message}")]
    #[diagnostic(code(persistence::backend))]
    Backend { message: String },

    #[error("{failed} of {total} reference updates failed")]
    #[diagnostic(code(persistence::partial_reference_update))]
    PartialReferenceUpdate { failed: usize, total: usize },
}

impl PersistenceError {
    pub fn backend(message: impl std::fmt::Display) -> Self {
        PersistenceError::Backend {
            message: message.to_string(),
        }
    }
}

/// Session configuration errors.
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("invalid configuration value for {field}: {message}")]
    #[diagnostic(
        code(config::invalid),
        help("unset {field} to use the default")
    )]
    Invalid { field: &'static str, message: String },
}
