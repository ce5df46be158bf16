//! Recently saved serializations, for recognizing echoes of our own saves.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
/// Bounded FIFO of serialized values, oldest first.
pub struct SaveHistory {
    entries: VecDeque<String>,
    max_entries: usize,
}

impl Default for SaveHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SaveHistory {
    /// Create an empty history holding at most `max_entries` values (at least one).
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Remember a saved value, evicting the oldest past capacity.
    pub fn push(&mut self, value: String) {
        if self.entries.back() == Some(&value) {
            return;
        }
        self.entries.push_back(value);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    /// Whether `value` was saved recently.
    pub fn contains(&self, value: &str) -> bool {
        self.entries.iter().any(|entry| entry == value)
    }

    /// Forget every entry, as when the session switches documents.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded() {
        let mut history = SaveHistory::new(2);
        history.push("a".into());
        history.push("b".into());
        history.push("c".into());
        assert_eq!(history.len(), 2);
        assert!(!history.contains("a"));
        assert!(history.contains("b"));
        assert!(history.contains("c"));
    }

    #[test]
    fn test_repeated_push_is_collapsed() {
        let mut history = SaveHistory::new(4);
        history.push("a".into());
        history.push("a".into());
        assert_eq!(history.len(), 1);
        history.clear();
        assert!(history.is_empty());
    }
}
