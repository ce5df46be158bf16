//! Leaf text storage.
//!
//! A text leaf holds either a plain string, as parsed from storage, or a
//! `TextBuffer`. Text operations only ever edit buffers, so the backend
//! decides what concurrent edits do: `EditorRope` is purely local, while the
//! Loro buffer in `outline-editor-crdt` converges across replicas.

use std::ops::Range;

use smol_str::{SmolStr, ToSmolStr};

/// Editable character storage for one text leaf.
///
/// Offsets count Unicode scalar values, never bytes.
pub trait TextBuffer {
    fn from_text(text: &str) -> Self
    where
        Self: Sized;

    fn len_chars(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    fn insert(&mut self, char_offset: usize, text: &str);

    fn push(&mut self, text: &str) {
        self.insert(self.len_chars(), text);
    }

    fn delete(&mut self, char_range: Range<usize>);

    /// Move everything from `char_offset` onwards into a new buffer, keeping
    /// the head in `self`.
    fn split_off(&mut self, char_offset: usize) -> Self
    where
        Self: Sized,
    {
        let len = self.len_chars();
        let tail = self.slice(char_offset..len).unwrap_or_default();
        self.delete(char_offset..len);
        Self::from_text(&tail)
    }

    /// `None` when the range runs past the end.
    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr>;

    fn to_string(&self) -> String;
}

/// Rope-backed buffer for single-replica editing.
#[derive(Clone, Debug, Default)]
pub struct EditorRope {
    rope: ropey::Rope,
}

impl TextBuffer for EditorRope {
    fn from_text(text: &str) -> Self {
        Self {
            rope: ropey::Rope::from_str(text),
        }
    }

    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn insert(&mut self, char_offset: usize, text: &str) {
        self.rope.insert(char_offset, text);
    }

    fn delete(&mut self, char_range: Range<usize>) {
        self.rope.remove(char_range);
    }

    fn split_off(&mut self, char_offset: usize) -> Self {
        Self {
            rope: self.rope.split_off(char_offset),
        }
    }

    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr> {
        if char_range.start > char_range.end || char_range.end > self.len_chars() {
            return None;
        }
        Some(self.rope.slice(char_range).to_smolstr())
    }

    fn to_string(&self) -> String {
        self.rope.to_string()
    }
}

impl From<&str> for EditorRope {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

/// Character content of a text leaf.
///
/// Leaves start out `Plain` and are promoted to a `Sequence` the first time a
/// text operation touches them. A promoted leaf is never demoted, so its
/// buffer history lives as long as the leaf.
#[derive(Clone, Debug)]
pub enum TextContent<T> {
    Plain(String),
    Sequence(T),
}

impl<T: TextBuffer> TextContent<T> {
    /// Promote to the sequence representation, returning the buffer.
    ///
    /// On an already promoted leaf this returns the existing buffer.
    pub fn promote(&mut self) -> &mut T {
        if let TextContent::Plain(text) = self {
            *self = TextContent::Sequence(T::from_text(text));
        }
        match self {
            TextContent::Sequence(buffer) => buffer,
            TextContent::Plain(_) => unreachable!("plain content promoted above"),
        }
    }

    pub fn is_promoted(&self) -> bool {
        matches!(self, TextContent::Sequence(_))
    }

    pub fn to_text(&self) -> String {
        match self {
            TextContent::Plain(text) => text.clone(),
            TextContent::Sequence(buffer) => buffer.to_string(),
        }
    }

    pub fn len_chars(&self) -> usize {
        match self {
            TextContent::Plain(text) => text.chars().count(),
            TextContent::Sequence(buffer) => buffer.len_chars(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }
}

impl<T> Default for TextContent<T> {
    fn default() -> Self {
        TextContent::Plain(String::new())
    }
}

// Equality compares characters, whatever the representation.
impl<T: TextBuffer> PartialEq for TextContent<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TextContent::Plain(a), TextContent::Plain(b)) => a == b,
            _ => self.to_text() == other.to_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rope_edits_count_chars() {
        let mut rope = EditorRope::from_text("héllo 🌍");
        assert_eq!(rope.len_chars(), 7);

        rope.insert(6, "wide ");
        assert_eq!(rope.to_string(), "héllo wide 🌍");
        rope.delete(1..2);
        assert_eq!(rope.to_string(), "hllo wide 🌍");
        assert_eq!(rope.slice(5..9).as_deref(), Some("wide"));
        assert_eq!(rope.slice(0..100), None);
    }

    #[test]
    fn test_split_off() {
        let mut rope = EditorRope::from_text("abcdef");
        let tail = rope.split_off(3);
        assert_eq!(rope.to_string(), "abc");
        assert_eq!(tail.to_string(), "def");
    }

    #[test]
    fn test_promote_is_idempotent() {
        let mut content: TextContent<EditorRope> = TextContent::Plain("ac".to_string());
        assert!(!content.is_promoted());

        content.promote().insert(1, "b");
        assert!(content.is_promoted());

        // A second promotion reuses the buffer instead of rebuilding it.
        content.promote().push("d");
        assert_eq!(content.to_text(), "abcd");
    }

    #[test]
    fn test_content_equality_ignores_representation() {
        let plain: TextContent<EditorRope> = TextContent::Plain("same".to_string());
        let sequence = TextContent::Sequence(EditorRope::from_text("same"));
        assert_eq!(plain, sequence);
    }
}
