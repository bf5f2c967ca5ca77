//! Linear undo/redo history over whole annotation-set snapshots
//!
//! Every entry is an immutable, shared snapshot of the full annotation list. Undo and
//! redo only move the cursor; a commit from a non-tip position discards the entries
//! after the cursor.

use crate::annotation::Annotation;
use std::sync::Arc;

/// Immutable copy of a document's annotation list at one point in history
pub type Snapshot = Arc<[Annotation]>;

/// Undo/redo stack with a cursor into its entries
#[derive(Debug, Clone)]
pub struct History {
    /// Never empty; entry 0 is the state the document was loaded with
    entries: Vec<Snapshot>,

    /// Index of the current entry
    cursor: usize,
}

impl History {
    /// Create a history whose only entry is `initial`
    pub fn new(initial: impl Into<Snapshot>) -> Self {
        Self { entries: vec![initial.into()], cursor: 0 }
    }

    /// Push `snapshot` as the new tip.
    ///
    /// Returns `false` without touching the history when `snapshot` equals the
    /// current entry, so gestures that changed nothing leave no trace.
    pub fn commit(&mut self, snapshot: impl Into<Snapshot>) -> bool {
        let snapshot = snapshot.into();
        if *snapshot == *self.entries[self.cursor] {
            return false;
        }

        self.entries.truncate(self.cursor + 1);
        self.entries.push(snapshot);
        self.cursor = self.entries.len() - 1;
        true
    }

    /// Step back one entry; returns whether the cursor moved
    pub fn undo(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// Step forward one entry; returns whether the cursor moved
    pub fn redo(&mut self) -> bool {
        if self.cursor + 1 >= self.entries.len() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Snapshot at the cursor
    pub fn current(&self) -> &Snapshot {
        &self.entries[self.cursor]
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Number of entries, including the initial one
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Drop all entries and start over from `initial`
    pub fn reset(&mut self, initial: impl Into<Snapshot>) {
        self.entries = vec![initial.into()];
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationId, AnnotationKind, ShapeKind};
    use proptest::prelude::*;

    fn square(id: &str, x: f32) -> Annotation {
        Annotation::new(
            AnnotationId::new(id),
            0,
            "red",
            AnnotationKind::Shape { shape: ShapeKind::Square, x, y: 0.0, width: 10.0, height: 10.0 },
        )
    }

    fn ids(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.iter().map(|a| a.id().as_str()).collect()
    }

    #[test]
    fn test_undo_redo_two_annotations() {
        let a = square("a", 0.0);
        let b = square("b", 20.0);
        let mut history = History::new(Vec::<Annotation>::new());

        assert!(history.commit(vec![a.clone()]));
        assert!(history.commit(vec![a.clone(), b.clone()]));

        assert!(history.undo());
        assert_eq!(ids(history.current()), vec!["a"]);
        assert!(history.undo());
        assert!(history.current().is_empty());
        assert!(!history.undo());

        assert!(history.redo());
        assert_eq!(ids(history.current()), vec!["a"]);
        assert!(history.redo());
        assert_eq!(ids(history.current()), vec!["a", "b"]);
        assert!(!history.redo());
    }

    #[test]
    fn test_duplicate_commit_is_ignored() {
        let mut history = History::new(vec![square("a", 0.0)]);
        assert!(!history.commit(vec![square("a", 0.0)]));
        assert_eq!(history.len(), 1);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_commit_after_undo_discards_forward_branch() {
        let mut history = History::new(Vec::<Annotation>::new());
        history.commit(vec![square("a", 0.0)]);
        history.commit(vec![square("a", 0.0), square("b", 1.0)]);
        history.undo();

        assert!(history.commit(vec![square("a", 0.0), square("c", 2.0)]));
        assert!(!history.can_redo());
        assert_eq!(history.len(), 3);
        assert_eq!(ids(history.current()), vec!["a", "c"]);
    }

    #[test]
    fn test_reset() {
        let mut history = History::new(Vec::<Annotation>::new());
        history.commit(vec![square("a", 0.0)]);
        history.reset(vec![square("z", 9.0)]);
        assert_eq!(history.len(), 1);
        assert_eq!(history.cursor(), 0);
        assert_eq!(ids(history.current()), vec!["z"]);
    }

    proptest! {
        #[test]
        fn prop_undo_all_then_redo_all(xs in prop::collection::vec(0i32..1000, 1..20)) {
            let mut history = History::new(Vec::<Annotation>::new());
            let mut committed = Vec::new();
            let mut list = Vec::new();
            for (i, x) in xs.iter().enumerate() {
                list.push(square(&i.to_string(), *x as f32));
                prop_assert!(history.commit(list.clone()));
                committed.push(list.clone());
            }

            for _ in 0..xs.len() {
                prop_assert!(history.undo());
            }
            prop_assert!(history.current().is_empty());

            for expected in &committed {
                prop_assert!(history.redo());
                prop_assert_eq!(&history.current()[..], &expected[..]);
            }
            prop_assert!(!history.can_redo());
        }

        #[test]
        fn prop_current_is_always_a_committed_snapshot(
            ops in prop::collection::vec(0u8..3, 1..40)
        ) {
            let mut history = History::new(Vec::<Annotation>::new());
            let mut seen: Vec<Vec<Annotation>> = vec![Vec::new()];
            let mut next = 0;
            for op in ops {
                match op {
                    0 => {
                        let mut list = history.current().to_vec();
                        list.push(square(&next.to_string(), next as f32));
                        next += 1;
                        history.commit(list.clone());
                        seen.push(list);
                    }
                    1 => { history.undo(); }
                    _ => { history.redo(); }
                }
                let current = history.current().to_vec();
                prop_assert!(seen.contains(&current));
            }
        }
    }
}
