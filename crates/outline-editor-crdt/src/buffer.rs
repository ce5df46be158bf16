//! Loro-backed text buffer for text leaves.

use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

use loro::{ExportMode, LoroDoc, LoroText, VersionVector};
use outline_editor_core::TextBuffer;
use smol_str::{SmolStr, ToSmolStr};

use crate::CrdtError;

const CONTAINER: &str = "content";

/// Sequence-CRDT text for a single leaf.
///
/// Each buffer wraps its own `LoroDoc` with one text container. Cloning a
/// buffer forks the document: the clone shares the full edit history but
/// writes under a new peer id, so two clones edited independently can later
/// exchange updates and converge.
pub struct LoroTextBuffer {
    doc: LoroDoc,
    content: LoroText,
}

impl LoroTextBuffer {
    /// Create an empty buffer on a fresh document with a random peer id.
    pub fn new() -> Self {
        let doc = LoroDoc::new();
        let content = doc.get_text(CONTAINER);
        Self { doc, content }
    }

    /// Restore a buffer from `export_snapshot` output.
    pub fn from_snapshot(snapshot: &[u8]) -> Result<Self, CrdtError> {
        let buffer = Self::new();
        buffer.doc.import(snapshot)?;
        Ok(buffer)
    }

    /// The underlying Loro document.
    pub fn doc(&self) -> &LoroDoc {
        &self.doc
    }

    /// Export the full document state and history, committing pending edits first.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, CrdtError> {
        self.doc.commit();
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| CrdtError::Loro(e.to_string()))
    }

    /// Changes this buffer has that `version` lacks, or `None` when there
    /// are none.
    pub fn export_updates_since(&self, version: &VersionVector) -> Option<Vec<u8>> {
        self.doc.commit();
        if *version == self.doc.oplog_vv() {
            return None;
        }
        let updates = self
            .doc
            .export(ExportMode::Updates {
                from: Cow::Borrowed(version),
            })
            .ok()?;
        (!updates.is_empty()).then_some(updates)
    }

    /// Import a snapshot or update blob from another replica.
    pub fn import(&mut self, data: &[u8]) -> Result<(), CrdtError> {
        self.doc.import(data)?;
        Ok(())
    }

    /// Version vector of every operation this buffer has seen.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    /// Pull every change `other` has that this buffer lacks.
    ///
    /// Returns true when the import brought in new operations.
    pub fn merge_from(&mut self, other: &LoroTextBuffer) -> Result<bool, CrdtError> {
        let before = self.version();
        if let Some(updates) = other.export_updates_since(&before) {
            self.import(&updates)?;
        }
        Ok(self.version() != before)
    }
}

impl Default for LoroTextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LoroTextBuffer {
    fn clone(&self) -> Self {
        self.doc.commit();
        let doc = self.doc.fork();
        let content = doc.get_text(CONTAINER);
        Self { doc, content }
    }
}

impl fmt::Debug for LoroTextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoroTextBuffer")
            .field("peer", &self.doc.peer_id())
            .field("content", &self.content.to_string())
            .finish()
    }
}

impl TextBuffer for LoroTextBuffer {
    fn from_text(text: &str) -> Self {
        let mut buffer = Self::new();
        buffer.insert(0, text);
        buffer.doc.commit();
        buffer
    }

    fn len_chars(&self) -> usize {
        self.content.len_unicode()
    }

    fn insert(&mut self, char_offset: usize, text: &str) {
        if let Err(e) = self.content.insert(char_offset, text) {
            tracing::warn!(char_offset, "loro insert failed: {e}");
        }
    }

    fn delete(&mut self, char_range: Range<usize>) {
        if char_range.is_empty() {
            return;
        }
        if let Err(e) = self.content.delete(char_range.start, char_range.len()) {
            tracing::warn!(?char_range, "loro delete failed: {e}");
        }
    }

    /// The tail is a fork of this buffer with the head deleted, so it keeps
    /// the shared history instead of starting a fresh one.
    fn split_off(&mut self, char_offset: usize) -> Self {
        let len = self.len_chars();
        let mut tail = self.clone();
        tail.delete(0..char_offset.min(len));
        self.delete(char_offset.min(len)..len);
        tail
    }

    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr> {
        if char_range.end > self.content.len_unicode() {
            return None;
        }
        self.content
            .slice(char_range.start, char_range.end)
            .ok()
            .map(|s| s.to_smolstr())
    }

    fn to_string(&self) -> String {
        self.content.to_string()
    }
}
