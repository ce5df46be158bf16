//! Synchronous session bookkeeping.
//!
//! `SessionState` decides what happens on every event the session sees. It
//! performs no I/O; the actor feeds it events and carries out the saves and
//! loads it asks for.

use std::collections::BTreeSet;

use outline_editor_core::{Operation, apply_mut, referenced_names, serialize_document};
use serde::Serialize;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::CrdtError;
use crate::buffer::LoroTextBuffer;
use crate::document::{Snapshot, parse_snapshot};
use crate::history::SaveHistory;
use crate::persist::{DocumentAddress, ReferenceDiff};

/// What happened to a value received from outside the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Our own value, or one we already hold.
    Ignored,
    Replaced,
    /// Unsaved local edits exist; the next save overwrites the remote value.
    LocalWins,
}

/// A save the actor should carry out.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub epoch: u64,
    pub address: DocumentAddress,
    pub value: String,
    pub references: BTreeSet<SmolStr>,
    pub diff: ReferenceDiff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The save belonged to a document that is no longer open.
    Stale,
    Saved { rearm: bool },
    /// The text was saved but some backlink updates failed.
    PartiallySaved { rearm: bool },
    Failed,
}

impl SaveOutcome {
    /// Whether another save cycle should be scheduled.
    pub fn needs_rearm(&self) -> bool {
        match self {
            SaveOutcome::Stale => false,
            SaveOutcome::Saved { rearm } | SaveOutcome::PartiallySaved { rearm } => *rearm,
            SaveOutcome::Failed => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub address: Option<DocumentAddress>,
    pub epoch: u64,
    pub loaded: bool,
    pub dirty: bool,
    /// True while a save is in flight and while failed saves are retried.
    pub saving: bool,
    pub failed_saves: u32,
    /// The last save stored the text but some backlink updates failed.
    pub references_failed: bool,
}

#[derive(Debug)]
pub struct SessionState {
    epoch: u64,
    address: Option<DocumentAddress>,
    value: Option<Snapshot>,
    serialized: String,
    last_saved: Option<String>,
    history: SaveHistory,
    persisted_references: BTreeSet<SmolStr>,
    dirty: bool,
    save_in_flight: bool,
    save_needed: bool,
    failed_saves: u32,
    references_failed: bool,
    last_revision: Option<SmolStr>,
}

impl SessionState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            epoch: 0,
            address: None,
            value: None,
            serialized: String::new(),
            last_saved: None,
            history: SaveHistory::new(history_capacity),
            persisted_references: BTreeSet::new(),
            dirty: false,
            save_in_flight: false,
            save_needed: false,
            failed_saves: 0,
            references_failed: false,
            last_revision: None,
        }
    }

    fn reset(&mut self, address: Option<DocumentAddress>) -> u64 {
        self.epoch += 1;
        self.address = address;
        self.value = None;
        self.serialized.clear();
        self.last_saved = None;
        self.history.clear();
        self.persisted_references.clear();
        self.dirty = false;
        self.save_in_flight = false;
        self.save_needed = false;
        self.failed_saves = 0;
        self.references_failed = false;
        self.last_revision = None;
        self.epoch
    }

    /// Drop everything about the current document and start a new epoch.
    ///
    /// Nothing from the previous document survives, and any load or save
    /// still running for it is stale from here on.
    pub fn switch_document(&mut self, address: DocumentAddress) -> u64 {
        info!(%address, epoch = self.epoch + 1, "switching document");
        self.reset(Some(address))
    }

    pub fn close(&mut self) -> u64 {
        self.reset(None)
    }

    /// Install a loaded value. Returns false when the load is stale.
    pub fn finish_load(&mut self, epoch: u64, stored: &str) -> Result<bool, CrdtError> {
        if epoch != self.epoch || self.address.is_none() {
            debug!(epoch, current = self.epoch, "dropping stale load");
            return Ok(false);
        }
        let snapshot = parse_snapshot(stored)?;
        let serialized = serialize_document(&snapshot)?;
        self.persisted_references = referenced_names(&snapshot);
        self.history.push(serialized.clone());
        self.last_saved = Some(serialized.clone());
        self.serialized = serialized;
        self.value = Some(snapshot);
        self.dirty = false;
        Ok(true)
    }

    /// Apply local edits. Returns true when the stored form changed.
    ///
    /// Edits land in place on the session's own value, so each leaf keeps a
    /// single buffer and its peer id across edits. A failing operation
    /// aborts the whole batch: the operations already applied are undone
    /// and the current value is kept.
    pub fn apply_local(&mut self, ops: &[Operation<LoroTextBuffer>]) -> Result<bool, CrdtError> {
        let value = self.value.as_mut().ok_or(CrdtError::NoDocument)?;
        if !ops.iter().any(Operation::changes_document) {
            return Ok(false);
        }
        for (index, op) in ops.iter().enumerate() {
            if let Err(e) = apply_mut(value, op) {
                debug!(index, op = op.name(), "edit rejected: {e}");
                if !undo(value, &ops[..index]) || serialize_document(value)? != self.serialized {
                    warn!(address = ?self.address, "could not undo a rejected edit, reloading value");
                    self.value = Some(parse_snapshot(&self.serialized)?);
                }
                return Err(e.into());
            }
        }
        let serialized = serialize_document(value)?;
        if serialized == self.serialized {
            return Ok(false);
        }
        self.serialized = serialized;
        self.dirty = true;
        Ok(true)
    }

    /// Reconcile a value that arrived from the store.
    pub fn receive_remote(&mut self, stored: &str) -> Result<RemoteOutcome, CrdtError> {
        if self.value.is_none() {
            return Ok(RemoteOutcome::Ignored);
        }
        if stored == self.serialized || self.history.contains(stored) {
            return Ok(RemoteOutcome::Ignored);
        }
        let snapshot = parse_snapshot(stored)?;
        let normalized = serialize_document(&snapshot)?;
        if normalized == self.serialized || self.history.contains(&normalized) {
            return Ok(RemoteOutcome::Ignored);
        }

        if self.dirty || self.save_in_flight {
            debug!(address = ?self.address, "remote change loses to unsaved local edits");
            self.dirty = true;
            return Ok(RemoteOutcome::LocalWins);
        }

        self.persisted_references = referenced_names(&snapshot);
        self.last_saved = Some(normalized.clone());
        self.serialized = normalized;
        self.value = Some(snapshot);
        Ok(RemoteOutcome::Replaced)
    }

    /// Start a save if one is due. While another save is in flight this
    /// only records that a further save is needed.
    pub fn begin_save(&mut self) -> Option<SaveRequest> {
        if !self.dirty {
            return None;
        }
        if self.save_in_flight {
            self.save_needed = true;
            return None;
        }
        let value = self.value.as_ref()?;
        let address = self.address.clone()?;

        let references = referenced_names(value);
        let diff = ReferenceDiff::between(&self.persisted_references, &references);
        self.dirty = false;
        self.save_in_flight = true;
        self.save_needed = false;
        // Recorded up front so the store's echo of this save is recognized
        // even if it arrives before the save completes.
        self.history.push(self.serialized.clone());

        Some(SaveRequest {
            epoch: self.epoch,
            address,
            value: self.serialized.clone(),
            references,
            diff,
        })
    }

    pub fn finish_save(&mut self, request: &SaveRequest, result: Result<(), CrdtError>) -> SaveOutcome {
        if request.epoch != self.epoch {
            debug!(epoch = request.epoch, current = self.epoch, "dropping stale save result");
            return SaveOutcome::Stale;
        }
        self.save_in_flight = false;
        let rearm = self.dirty || self.save_needed;
        self.save_needed = false;

        match result {
            Ok(()) => {
                self.last_saved = Some(request.value.clone());
                self.persisted_references = request.references.clone();
                self.failed_saves = 0;
                self.references_failed = false;
                SaveOutcome::Saved { rearm }
            }
            Err(CrdtError::PartialReferenceUpdate { failed, total }) => {
                warn!(address = %request.address, failed, total, "saved with failed reference updates");
                self.last_saved = Some(request.value.clone());
                self.failed_saves = 0;
                self.references_failed = true;
                SaveOutcome::PartiallySaved { rearm }
            }
            Err(e) => {
                self.failed_saves += 1;
                warn!(
                    address = %request.address,
                    attempts = self.failed_saves,
                    "save failed, will retry: {e}"
                );
                self.dirty = true;
                SaveOutcome::Failed
            }
        }
    }

    /// Record a change event revision. Returns false when it was already
    /// seen.
    pub fn note_revision(&mut self, revision: &SmolStr) -> bool {
        if self.last_revision.as_ref() == Some(revision) {
            return false;
        }
        self.last_revision = Some(revision.clone());
        true
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            address: self.address.clone(),
            epoch: self.epoch,
            loaded: self.value.is_some(),
            dirty: self.dirty,
            saving: self.save_in_flight || (self.dirty && self.failed_saves > 0),
            failed_saves: self.failed_saves,
            references_failed: self.references_failed,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn address(&self) -> Option<&DocumentAddress> {
        self.address.as_ref()
    }

    pub fn value(&self) -> Option<&Snapshot> {
        self.value.as_ref()
    }

    /// The stored form of the current value.
    pub fn serialized(&self) -> Option<&str> {
        self.value.as_ref().map(|_| self.serialized.as_str())
    }

    pub fn last_saved(&self) -> Option<&str> {
        self.last_saved.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_saving(&self) -> bool {
        self.save_in_flight
    }
}

/// Undo `applied` in reverse order. Returns false when some operation
/// cannot be inverted or its inverse does not apply.
fn undo(value: &mut Snapshot, applied: &[Operation<LoroTextBuffer>]) -> bool {
    applied.iter().rev().all(|op| {
        op.inverse()
            .is_some_and(|inverse| apply_mut(value, &inverse).is_ok())
    })
}
