//! Loro-backed outline documents and the document session.
//!
//! This crate provides:
//! - `LoroTextBuffer`: a Loro sequence implementing `TextBuffer`
//! - snapshot helpers for replaying operation logs and merging replica text
//! - persistence traits for document stores, backlink indexes and backups
//! - the session actor that debounces saves and reconciles remote values

mod buffer;
pub mod config;
mod debounce;
mod document;
mod error;
mod history;
pub mod persist;
pub mod session;

pub use buffer::LoroTextBuffer;
pub use config::{BackupSchedule, SessionConfig};
pub use debounce::Debounce;
pub use document::{Snapshot, leaf_text, merge_text, parse_snapshot, promote_all, replay};
pub use error::{ConfigError, CrdtError, PersistenceError};
pub use history::SaveHistory;
pub use persist::{
    BacklinkIndex, BackupSink, ChangeEvent, DocumentAddress, DocumentStore, LinkedStore,
    MemoryStore, ReferenceDiff, run_backups, update_backlinks,
};
pub use session::{RemoteOutcome, SessionHandle, SessionStatus, spawn_session};

// Re-export Loro types that consumers need
pub use loro::{LoroDoc, VersionVector};
