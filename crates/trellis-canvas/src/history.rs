//! Bounded undo/redo over whole-graph snapshots.
//!
//! A single stack with a cursor: the entry at `cursor` is the current state,
//! entries after it are redo states. Pushing truncates the redo tail.
//!
//! ```text
//! push A, push B, push C      [A, B, C]   cursor = 2
//! undo                        [A, B, C]   cursor = 1  → B
//! push D                      [A, B, D]   cursor = 2  (C is gone)
//! ```
//!
//! The first entry is the baseline and cannot be undone past. Exhausting
//! either direction is a no-op (`None`), never an error.

use std::collections::VecDeque;

use trellis_types::GraphSnapshot;

use crate::config::DEFAULT_HISTORY_DEPTH;

#[derive(Debug, Clone)]
pub struct HistoryManager {
    stack: VecDeque<GraphSnapshot>,
    /// Index of the current state. `None` until the first push.
    cursor: Option<usize>,
    max_depth: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl HistoryManager {
    /// Create an empty history keeping at most `max_depth` snapshots
    /// (clamped to at least 1).
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: VecDeque::new(),
            cursor: None,
            max_depth: max_depth.max(1),
        }
    }

    /// Record a new current state, discarding any redo states.
    pub fn push_state(&mut self, snapshot: GraphSnapshot) {
        let keep = self.cursor.map_or(0, |c| c + 1);
        self.stack.truncate(keep);
        self.stack.push_back(snapshot);

        if self.stack.len() > self.max_depth {
            let excess = self.stack.len() - self.max_depth;
            self.stack.drain(0..excess);
        }
        self.cursor = Some(self.stack.len() - 1);
    }

    /// Step back one state and return it.
    pub fn undo(&mut self) -> Option<&GraphSnapshot> {
        let cursor = self.cursor.filter(|&c| c > 0)? - 1;
        self.cursor = Some(cursor);
        self.stack.get(cursor)
    }

    /// Step forward one state and return it.
    pub fn redo(&mut self) -> Option<&GraphSnapshot> {
        let cursor = self.cursor? + 1;
        if cursor >= self.stack.len() {
            return None;
        }
        self.cursor = Some(cursor);
        self.stack.get(cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.stack.len())
    }

    /// The state at the cursor.
    pub fn current(&self) -> Option<&GraphSnapshot> {
        self.stack.get(self.cursor?)
    }

    /// Number of stored snapshots, including redo states.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Rewrite every stored snapshot in place. The cursor does not move.
    pub fn rewrite(&mut self, f: impl FnMut(&mut GraphSnapshot)) {
        self.stack.iter_mut().for_each(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use trellis_types::{BlockKind, BlockOverrides, CanvasPoint, create_block};

    /// Snapshot with `n` text blocks, distinguishable by count.
    fn snap(n: usize) -> GraphSnapshot {
        let blocks = (0..n)
            .map(|_| create_block(BlockKind::Text, CanvasPoint::default(), BlockOverrides::new()))
            .collect();
        GraphSnapshot::new(blocks, Vec::new())
    }

    #[test]
    fn test_empty_history_is_inert() {
        let mut history = HistoryManager::new(10);
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(history.current().is_none());
    }

    #[test]
    fn test_baseline_cannot_be_undone() {
        let mut history = HistoryManager::new(10);
        history.push_state(snap(0));
        assert!(!history.can_undo());
        assert!(history.undo().is_none());
        assert_eq!(history.current(), Some(&snap(0)));
    }

    #[test]
    fn test_undo_redo_walks_the_stack() {
        let mut history = HistoryManager::new(10);
        let states: Vec<GraphSnapshot> = (0..3).map(snap).collect();
        for s in &states {
            history.push_state(s.clone());
        }

        assert_eq!(history.undo(), Some(&states[1]));
        assert_eq!(history.undo(), Some(&states[0]));
        assert!(history.undo().is_none());
        assert!(history.can_redo());
        assert_eq!(history.redo(), Some(&states[1]));
        assert_eq!(history.redo(), Some(&states[2]));
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_push_after_undo_truncates_redo() {
        let mut history = HistoryManager::new(10);
        history.push_state(snap(0));
        history.push_state(snap(1));
        history.push_state(snap(2));
        history.undo();

        let branch = snap(5);
        history.push_state(branch.clone());
        assert!(!history.can_redo());
        assert_eq!(history.len(), 3);
        assert_eq!(history.current(), Some(&branch));
    }

    #[test]
    fn test_depth_drops_oldest() {
        let mut history = HistoryManager::new(3);
        let states: Vec<GraphSnapshot> = (0..5).map(snap).collect();
        for s in &states {
            history.push_state(s.clone());
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.current(), Some(&states[4]));
        history.undo();
        assert_eq!(history.undo(), Some(&states[2]));
        assert!(!history.can_undo());
    }

    #[test]
    fn test_zero_depth_is_clamped() {
        let mut history = HistoryManager::new(0);
        assert_eq!(history.max_depth(), 1);
        history.push_state(snap(1));
        history.push_state(snap(2));
        assert_eq!(history.len(), 1);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_rewrite_touches_every_state() {
        let mut history = HistoryManager::new(10);
        history.push_state(snap(1));
        history.push_state(snap(2));
        history.undo();

        history.rewrite(|s| s.blocks.clear());
        assert_eq!(history.len(), 2);
        assert_eq!(history.current(), Some(&snap(0)));
        assert_eq!(history.redo(), Some(&snap(0)));
    }

    proptest! {
        /// n undos from the tip reach the baseline; n redos return to the tip.
        #[test]
        fn prop_undo_redo_inverse(n in 1usize..20) {
            let mut history = HistoryManager::new(64);
            let states: Vec<GraphSnapshot> = (0..=n).map(snap).collect();
            for s in &states {
                history.push_state(s.clone());
            }

            for _ in 0..n {
                prop_assert!(history.undo().is_some());
            }
            prop_assert_eq!(history.current(), Some(&states[0]));
            prop_assert!(!history.can_undo());

            for _ in 0..n {
                prop_assert!(history.redo().is_some());
            }
            prop_assert_eq!(history.current(), Some(&states[n]));
            prop_assert!(!history.can_redo());
        }
    }
}
