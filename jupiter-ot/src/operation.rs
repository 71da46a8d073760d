//! Text operations and their inclusion transformation.
//!
//! Positions and lengths count Unicode scalar values (`char`s), never bytes,
//! so every replica agrees on offsets regardless of encoding.
//!
//! `transform(a, b, p)` rewrites `a` so it can be applied after `b` has
//! already been applied. For any two concurrent operations on the same
//! document state the pair
//!
//! ```text
//! apply(apply(S, b), transform(a, b, p)) == apply(apply(S, a), transform(b, a, !p))
//! ```
//!
//! holds (TP1). The Jupiter protocol only ever transforms operations between
//! two parties, so TP1 is all the core relies on.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransformationError;

/// Who wins when two inserts land on the same position with the same origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    /// The transformed operation keeps its position (ends up first).
    High,
    /// The transformed operation is shifted behind the other one.
    Low,
}

impl Priority {
    pub fn opposite(self) -> Self {
        match self {
            Priority::High => Priority::Low,
            Priority::Low => Priority::High,
        }
    }
}

/// A single edit on a flat text document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Insert `text` before the char at `position`.
    ///
    /// `origin` is the position the insert was generated at. It survives
    /// transformation and orders concurrent inserts that end up on the same
    /// position.
    Insert {
        position: usize,
        text: String,
        origin: usize,
    },
    /// Remove `text` starting at `position`. The payload lets the delete be
    /// transformed (and split) without reading the buffer.
    Delete { position: usize, text: String },
    /// Apply `first`, then `second`. `second` is expressed in the document
    /// state produced by `first`.
    Split {
        first: Box<Operation>,
        second: Box<Operation>,
    },
    NoOp,
}

impl Operation {
    /// Insert generated locally at `position`; the origin is the position itself.
    /// Empty text yields `NoOp`.
    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Self::insert_with_origin(position, text, position)
    }

    pub fn insert_with_origin(position: usize, text: impl Into<String>, origin: usize) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Operation::NoOp;
        }
        Operation::Insert {
            position,
            text,
            origin,
        }
    }

    /// Empty text yields `NoOp`.
    pub fn delete(position: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Operation::NoOp;
        }
        Operation::Delete { position, text }
    }

    /// Sequential composition; `NoOp` halves collapse away.
    pub fn split(first: Operation, second: Operation) -> Self {
        match (first, second) {
            (Operation::NoOp, op) | (op, Operation::NoOp) => op,
            (first, second) => Operation::Split {
                first: Box::new(first),
                second: Box::new(second),
            },
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Operation::NoOp)
    }

    /// The operation that undoes this one when applied right after it.
    pub fn invert(&self) -> Operation {
        match self {
            Operation::Insert { position, text, .. } => Operation::delete(*position, text.clone()),
            Operation::Delete { position, text } => Operation::insert(*position, text.clone()),
            Operation::Split { first, second } => Operation::split(second.invert(), first.invert()),
            Operation::NoOp => Operation::NoOp,
        }
    }

    /// Rewrite `self` so it applies after `other`, both generated on the same
    /// document state.
    pub fn transform(
        &self,
        other: &Operation,
        priority: Priority,
    ) -> Result<Operation, TransformationError> {
        match (self, other) {
            (Operation::NoOp, _) => Ok(Operation::NoOp),
            (_, Operation::NoOp) => Ok(self.clone()),

            (Operation::Split { first, second }, _) => {
                let first_t = first.transform(other, priority)?;
                // `other` as seen after `first` has been applied.
                let other_t = other.transform(first, priority.opposite())?;
                let second_t = second.transform(&other_t, priority)?;
                Ok(Operation::split(first_t, second_t))
            }
            (_, Operation::Split { first, second }) => {
                self.transform(first, priority)?.transform(second, priority)
            }

            (
                Operation::Insert {
                    position: pos_a,
                    text: text_a,
                    origin: origin_a,
                },
                Operation::Insert {
                    position: pos_b,
                    text: text_b,
                    origin: origin_b,
                },
            ) => {
                let a_first = pos_a < pos_b
                    || (pos_a == pos_b
                        && (origin_a < origin_b
                            || (origin_a == origin_b && priority == Priority::High)));
                if a_first {
                    Ok(self.clone())
                } else {
                    let position = checked_add(*pos_a, char_len(text_b), "insert/insert")?;
                    Ok(Operation::insert_with_origin(position, text_a.clone(), *origin_a))
                }
            }

            (
                Operation::Insert {
                    position: pos_a,
                    text: text_a,
                    origin,
                },
                Operation::Delete {
                    position: pos_b,
                    text: text_b,
                },
            ) => {
                let end_b = checked_add(*pos_b, char_len(text_b), "insert/delete")?;
                if pos_a <= pos_b {
                    Ok(self.clone())
                } else if *pos_a >= end_b {
                    Ok(Operation::insert_with_origin(
                        pos_a - char_len(text_b),
                        text_a.clone(),
                        *origin,
                    ))
                } else {
                    // Landed inside the deleted range: the text survives at its start.
                    Ok(Operation::insert_with_origin(*pos_b, text_a.clone(), *origin))
                }
            }

            (
                Operation::Delete {
                    position: pos_a,
                    text: text_a,
                },
                Operation::Insert {
                    position: pos_b,
                    text: text_b,
                    ..
                },
            ) => {
                let len_a = char_len(text_a);
                let len_b = char_len(text_b);
                let end_a = checked_add(*pos_a, len_a, "delete/insert")?;
                if *pos_b >= end_a {
                    Ok(self.clone())
                } else if pos_b <= pos_a {
                    let position = checked_add(*pos_a, len_b, "delete/insert")?;
                    Ok(Operation::delete(position, text_a.clone()))
                } else {
                    // The insert splits the deleted range; keep the inserted text.
                    let cut = pos_b - pos_a;
                    let head = char_slice(text_a, 0, cut)?;
                    let tail = char_slice(text_a, cut, len_a)?;
                    let tail_position = checked_add(*pos_a, len_b, "delete/insert")?;
                    Ok(Operation::split(
                        Operation::delete(*pos_a, head),
                        Operation::delete(tail_position, tail),
                    ))
                }
            }

            (
                Operation::Delete {
                    position: pos_a,
                    text: text_a,
                },
                Operation::Delete {
                    position: pos_b,
                    text: text_b,
                },
            ) => {
                let len_a = char_len(text_a);
                let len_b = char_len(text_b);
                let end_a = checked_add(*pos_a, len_a, "delete/delete")?;
                let end_b = checked_add(*pos_b, len_b, "delete/delete")?;

                if end_a <= *pos_b {
                    Ok(self.clone())
                } else if *pos_a >= end_b {
                    Ok(Operation::delete(pos_a - len_b, text_a.clone()))
                } else if pos_b <= pos_a && end_a <= end_b {
                    // Everything was already deleted by `other`.
                    Ok(Operation::NoOp)
                } else if pos_b <= pos_a {
                    let tail = char_slice(text_a, end_b - pos_a, len_a)?;
                    Ok(Operation::delete(*pos_b, tail))
                } else if end_a <= end_b {
                    let head = char_slice(text_a, 0, pos_b - pos_a)?;
                    Ok(Operation::delete(*pos_a, head))
                } else {
                    let mut remaining = char_slice(text_a, 0, pos_b - pos_a)?;
                    remaining.push_str(&char_slice(text_a, end_b - pos_a, len_a)?);
                    Ok(Operation::delete(*pos_a, remaining))
                }
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert {
                position,
                text,
                origin,
            } => write!(f, "Insert({position}, {text:?}, origin {origin})"),
            Operation::Delete { position, text } => write!(f, "Delete({position}, {text:?})"),
            Operation::Split { first, second } => write!(f, "Split({first}, {second})"),
            Operation::NoOp => write!(f, "NoOp"),
        }
    }
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Chars `start..end` of `text` as an owned string.
pub(crate) fn char_slice(text: &str, start: usize, end: usize) -> Result<String, TransformationError> {
    let len = char_len(text);
    if start > end || end > len {
        return Err(TransformationError::SliceOutOfRange { start, end, len });
    }
    Ok(text.chars().skip(start).take(end - start).collect())
}

fn checked_add(a: usize, b: usize, context: &'static str) -> Result<usize, TransformationError> {
    a.checked_add(b)
        .ok_or(TransformationError::PositionOverflow(context))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(a: &Operation, b: &Operation, p: Priority) -> Operation {
        a.transform(b, p).unwrap()
    }

    #[test]
    fn test_constructors_collapse_empty_text() {
        assert_eq!(Operation::insert(3, ""), Operation::NoOp);
        assert_eq!(Operation::delete(3, ""), Operation::NoOp);
        assert_eq!(
            Operation::split(Operation::NoOp, Operation::delete(1, "x")),
            Operation::delete(1, "x")
        );
        assert_eq!(
            Operation::split(Operation::insert(0, "a"), Operation::NoOp),
            Operation::insert(0, "a")
        );
    }

    #[test]
    fn test_noop_identity() {
        let ins = Operation::insert(2, "ab");
        assert_eq!(t(&Operation::NoOp, &ins, Priority::High), Operation::NoOp);
        assert_eq!(t(&ins, &Operation::NoOp, Priority::Low), ins);
    }

    #[test]
    fn test_insert_insert_positions() {
        let a = Operation::insert(1, "x");
        let b = Operation::insert(4, "yy");
        assert_eq!(t(&a, &b, Priority::Low), a);
        assert_eq!(t(&b, &a, Priority::High), Operation::insert_with_origin(5, "yy", 4));
    }

    #[test]
    fn test_insert_insert_tie_uses_priority() {
        let a = Operation::insert(0, "x");
        let b = Operation::insert(0, "y");
        assert_eq!(t(&a, &b, Priority::High), a);
        assert_eq!(t(&b, &a, Priority::Low), Operation::insert_with_origin(1, "y", 0));
    }

    #[test]
    fn test_insert_insert_tie_prefers_lower_origin() {
        // Both ended up at 2, but `a` was generated further left.
        let a = Operation::insert_with_origin(2, "a", 0);
        let b = Operation::insert_with_origin(2, "b", 2);
        assert_eq!(t(&a, &b, Priority::Low), a);
        assert_eq!(t(&b, &a, Priority::High), Operation::insert_with_origin(3, "b", 2));
    }

    #[test]
    fn test_insert_against_delete() {
        let del = Operation::delete(2, "cde");
        assert_eq!(t(&Operation::insert(1, "x"), &del, Priority::Low), Operation::insert(1, "x"));
        assert_eq!(t(&Operation::insert(2, "x"), &del, Priority::Low), Operation::insert(2, "x"));
        assert_eq!(
            t(&Operation::insert(6, "x"), &del, Priority::Low),
            Operation::insert_with_origin(3, "x", 6)
        );
        assert_eq!(
            t(&Operation::insert(4, "x"), &del, Priority::Low),
            Operation::insert_with_origin(2, "x", 4)
        );
    }

    #[test]
    fn test_delete_against_insert_shifts() {
        let del = Operation::delete(2, "cd");
        assert_eq!(t(&del, &Operation::insert(0, "xyz"), Priority::Low), Operation::delete(5, "cd"));
        assert_eq!(t(&del, &Operation::insert(4, "xyz"), Priority::Low), del);
    }

    #[test]
    fn test_delete_straddling_insert_splits() {
        let del = Operation::delete(1, "bcd");
        let ins = Operation::insert(2, "XY");
        let split = t(&del, &ins, Priority::Low);
        assert_eq!(
            split,
            Operation::split(Operation::delete(1, "b"), Operation::delete(3, "cd"))
        );
    }

    #[test]
    fn test_delete_delete_cases() {
        let a = Operation::delete(2, "cdef");
        // disjoint
        assert_eq!(t(&a, &Operation::delete(0, "ab"), Priority::Low), Operation::delete(0, "cdef"));
        assert_eq!(t(&a, &Operation::delete(7, "h"), Priority::Low), a);
        // covered entirely
        assert_eq!(t(&a, &Operation::delete(1, "bcdefg"), Priority::Low), Operation::NoOp);
        // overlap on the left
        assert_eq!(t(&a, &Operation::delete(1, "bcd"), Priority::Low), Operation::delete(1, "ef"));
        // overlap on the right
        assert_eq!(t(&a, &Operation::delete(4, "efg"), Priority::Low), Operation::delete(2, "cd"));
        // other strictly inside
        assert_eq!(t(&a, &Operation::delete(3, "de"), Priority::Low), Operation::delete(2, "cf"));
    }

    #[test]
    fn test_split_transformed_against_insert() {
        let split = Operation::split(Operation::delete(0, "a"), Operation::delete(2, "d"));
        let ins = Operation::insert(1, "Q");
        // After the first half "a" is gone, so the insert is at 0 when the
        // second half is transformed.
        let out = t(&split, &ins, Priority::Low);
        assert_eq!(
            out,
            Operation::split(Operation::delete(0, "a"), Operation::delete(3, "d"))
        );
    }

    #[test]
    fn test_insert_transformed_against_split() {
        let split = Operation::split(Operation::delete(0, "a"), Operation::delete(2, "d"));
        let ins = Operation::insert_with_origin(4, "!", 4);
        assert_eq!(t(&ins, &split, Priority::High), Operation::insert_with_origin(2, "!", 4));
    }

    #[test]
    fn test_invert() {
        assert_eq!(Operation::insert(3, "ab").invert(), Operation::delete(3, "ab"));
        assert_eq!(Operation::delete(1, "x").invert(), Operation::insert(1, "x"));
        let split = Operation::split(Operation::delete(0, "a"), Operation::delete(2, "d"));
        assert_eq!(
            split.invert(),
            Operation::split(Operation::insert(2, "d"), Operation::insert(0, "a"))
        );
        assert_eq!(Operation::NoOp.invert(), Operation::NoOp);
    }

    #[test]
    fn test_positions_count_chars_not_bytes() {
        let a = Operation::insert(5, "!");
        let b = Operation::insert(0, "héllo");
        assert_eq!(t(&a, &b, Priority::Low), Operation::insert_with_origin(10, "!", 5));
        let del = Operation::delete(0, "héllo");
        let ins = Operation::insert(2, "·");
        assert_eq!(
            t(&del, &ins, Priority::Low),
            Operation::split(Operation::delete(0, "hé"), Operation::delete(1, "llo"))
        );
    }

    #[test]
    fn test_char_slice_out_of_range() {
        assert!(matches!(
            char_slice("abc", 2, 5),
            Err(TransformationError::SliceOutOfRange { start: 2, end: 5, len: 3 })
        ));
        assert_eq!(char_slice("abc", 1, 3).unwrap(), "bc");
    }

    #[test]
    fn test_overflow_is_reported() {
        let a = Operation::insert(usize::MAX, "x");
        let b = Operation::insert(0, "y");
        assert!(matches!(
            a.transform(&b, Priority::Low),
            Err(TransformationError::PositionOverflow(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Operation::insert(1, "a").to_string(), "Insert(1, \"a\", origin 1)");
        assert_eq!(Operation::delete(0, "b").to_string(), "Delete(0, \"b\")");
        assert_eq!(Operation::NoOp.to_string(), "NoOp");
    }

    #[test]
    fn test_json_shape_is_tagged_by_variant() {
        let json = serde_json::to_value(Operation::delete(2, "cd")).unwrap();
        assert_eq!(json["Delete"]["position"], 2);
        assert_eq!(json["Delete"]["text"], "cd");
        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back, Operation::delete(2, "cd"));
    }
}
