//! Rope-backed text replica that operations are applied to.
//!
//! Deletes carry the text they remove. Applying one checks that text against
//! the buffer, which is the cheapest point to notice that two replicas have
//! drifted apart.

use ropey::Rope;

use crate::error::TransformationError;
use crate::operation::{char_len, Operation};

#[derive(Debug, Clone, Default)]
pub struct TextDocument {
    rope: Rope,
}

impl TextDocument {
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    /// Apply `op`. On error the document is unchanged.
    pub fn apply(&mut self, op: &Operation) -> Result<(), TransformationError> {
        match op {
            Operation::NoOp => Ok(()),
            Operation::Insert { position, text, .. } => {
                let len = self.rope.len_chars();
                if *position > len {
                    return Err(TransformationError::OutOfBounds {
                        position: *position,
                        len,
                    });
                }
                self.rope.insert(*position, text);
                Ok(())
            }
            Operation::Delete { position, text } => {
                let len = self.rope.len_chars();
                let end = position
                    .checked_add(char_len(text))
                    .ok_or(TransformationError::PositionOverflow("delete apply"))?;
                if end > len {
                    return Err(TransformationError::OutOfBounds { position: end, len });
                }
                let found = String::from(self.rope.slice(*position..end));
                if found != *text {
                    return Err(TransformationError::DeleteMismatch {
                        position: *position,
                        expected: text.clone(),
                        found,
                    });
                }
                self.rope.remove(*position..end);
                Ok(())
            }
            Operation::Split { first, second } => {
                // Rope clones share their nodes, so this is cheap.
                let before = self.rope.clone();
                self.apply(first)?;
                if let Err(e) = self.apply(second) {
                    self.rope = before;
                    return Err(e);
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for TextDocument {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_delete() {
        let mut doc = TextDocument::new("abcd");
        doc.apply(&Operation::insert(2, "XY")).unwrap();
        assert_eq!(doc.text(), "abXYcd");
        doc.apply(&Operation::delete(1, "bX")).unwrap();
        assert_eq!(doc.text(), "aYcd");
        assert_eq!(doc.len(), 4);
    }

    #[test]
    fn test_insert_at_end() {
        let mut doc = TextDocument::new("ab");
        doc.apply(&Operation::insert(2, "c")).unwrap();
        assert_eq!(doc.text(), "abc");
    }

    #[test]
    fn test_insert_past_end_fails() {
        let mut doc = TextDocument::new("ab");
        let err = doc.apply(&Operation::insert(3, "c")).unwrap_err();
        assert_eq!(err, TransformationError::OutOfBounds { position: 3, len: 2 });
        assert_eq!(doc.text(), "ab");
    }

    #[test]
    fn test_delete_mismatch_is_detected() {
        let mut doc = TextDocument::new("abcd");
        let err = doc.apply(&Operation::delete(1, "bd")).unwrap_err();
        assert!(matches!(err, TransformationError::DeleteMismatch { .. }));
        assert_eq!(doc.text(), "abcd");
    }

    #[test]
    fn test_delete_past_end_fails() {
        let mut doc = TextDocument::new("abc");
        assert!(doc.apply(&Operation::delete(2, "cd")).is_err());
    }

    #[test]
    fn test_split_applies_sequentially() {
        let mut doc = TextDocument::new("abXYcde");
        let split = Operation::split(Operation::delete(1, "b"), Operation::delete(3, "cd"));
        doc.apply(&split).unwrap();
        assert_eq!(doc.text(), "aXYe");
    }

    #[test]
    fn test_failed_split_rolls_back() {
        let mut doc = TextDocument::new("abcd");
        let split = Operation::split(Operation::delete(0, "a"), Operation::delete(0, "zz"));
        assert!(doc.apply(&split).is_err());
        assert_eq!(doc.text(), "abcd");
    }

    #[test]
    fn test_noop_leaves_document() {
        let mut doc = TextDocument::new("abc");
        doc.apply(&Operation::NoOp).unwrap();
        assert_eq!(doc.text(), "abc");
    }

    #[test]
    fn test_multibyte_positions() {
        let mut doc = TextDocument::new("grüße");
        doc.apply(&Operation::delete(2, "üß")).unwrap();
        doc.apply(&Operation::insert(2, "ü")).unwrap();
        assert_eq!(doc.text(), "grüe");
        assert!(!doc.is_empty());
    }

    #[test]
    fn test_invert_restores_text() {
        let mut doc = TextDocument::new("hello world");
        let op = Operation::split(Operation::delete(0, "hello"), Operation::insert(1, "big "));
        doc.apply(&op).unwrap();
        assert_eq!(doc.text(), " big world");
        doc.apply(&op.invert()).unwrap();
        assert_eq!(doc.text(), "hello world");
    }
}
