//! Per-index undo log.
//!
//! Each open session owns one [`UndoFrame`]: the inverse of every change
//! made to the index while it was the innermost session, in the order the
//! changes happened. Reverting a frame folds over its records in reverse.

use sdb_types::Id;

/// Inverse of one change.
#[derive(Clone, Debug, PartialEq)]
pub enum UndoRecord<T> {
    /// An object was created; reverting removes it.
    Created(Id<T>),
    /// An object was modified; holds the value before the change.
    Modified(T),
    /// An object was removed; holds the removed value.
    Removed(T),
}

/// Undo records of one session, plus the state needed to rewind identity.
#[derive(Clone, Debug)]
pub struct UndoFrame<T> {
    pub revision: u64,
    /// Identity counter when the session started.
    pub next_id: u64,
    pub records: Vec<UndoRecord<T>>,
}

impl<T> UndoFrame<T> {
    pub fn new(revision: u64, next_id: u64) -> Self {
        Self {
            revision,
            next_id,
            records: Vec::new(),
        }
    }

    /// Fold a committed inner frame into this one.
    ///
    /// The inner records are appended after this frame's own records, so a
    /// later revert of this frame still unwinds every change in exact
    /// reverse order.
    pub fn absorb(&mut self, inner: UndoFrame<T>) {
        self.records.extend(inner.records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_keeps_chronological_order() {
        let mut outer: UndoFrame<u32> = UndoFrame::new(1, 10);
        outer.records.push(UndoRecord::Created(Id::new(10)));
        let mut inner = UndoFrame::new(2, 11);
        inner.records.push(UndoRecord::Modified(5));
        inner.records.push(UndoRecord::Removed(6));

        outer.absorb(inner);
        assert_eq!(outer.revision, 1);
        assert_eq!(outer.next_id, 10);
        assert_eq!(
            outer.records,
            vec![
                UndoRecord::Created(Id::new(10)),
                UndoRecord::Modified(5),
                UndoRecord::Removed(6),
            ]
        );
    }
}
