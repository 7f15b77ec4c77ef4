//! Snapshot-based undo/redo for the planning document.

use crate::planning::Waypoint;
use std::collections::VecDeque;

/// Immutable copy of everything an undo step restores.
///
/// Two snapshots are equal iff every field is structurally equal.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSnapshot {
    pub waypoints: Vec<Waypoint>,
    /// Selected indices in selection order
    pub selected: Vec<usize>,
    pub primary: Option<usize>,
    pub playback_distance: f64,
}

/// Bounded undo and redo stacks.
#[derive(Debug, Clone)]
pub struct UndoHistory {
    undo: VecDeque<PlanSnapshot>,
    redo: Vec<PlanSnapshot>,
    depth: usize,
}

impl UndoHistory {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Records the state before a new mutation.
    ///
    /// Suppressed when identical to the top entry; otherwise redo is
    /// cleared. Returns whether an entry was added.
    pub fn push(&mut self, snapshot: PlanSnapshot) -> bool {
        if self.undo.back() == Some(&snapshot) {
            return false;
        }
        self.redo.clear();
        self.undo.push_back(snapshot);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
        true
    }

    /// Pops the latest undo entry, parking `current` on the redo stack.
    pub fn undo(&mut self, current: PlanSnapshot) -> Option<PlanSnapshot> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    /// Mirror of [`UndoHistory::undo`].
    pub fn redo(&mut self, current: PlanSnapshot) -> Option<PlanSnapshot> {
        let next = self.redo.pop()?;
        self.undo.push_back(current);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(n: usize) -> PlanSnapshot {
        PlanSnapshot {
            waypoints: (0..n).map(|i| Waypoint::new(i as f64, 0.0, 0.0)).collect(),
            selected: vec![],
            primary: None,
            playback_distance: 0.0,
        }
    }

    #[test]
    fn test_identical_pushes_collapse() {
        let mut history = UndoHistory::new(80);
        assert!(history.push(snap(1)));
        assert!(!history.push(snap(1)));
        assert_eq!(history.undo_len(), 1);

        // A suppressed push leaves redo alone
        history.push(snap(2));
        assert_eq!(history.undo(snap(3)), Some(snap(2)));
        assert!(!history.push(snap(1)));
        assert_eq!(history.redo_len(), 1);

        assert!(history.push(snap(4)));
        assert_eq!(history.redo_len(), 0);
    }

    #[test]
    fn test_depth_cap() {
        let mut history = UndoHistory::new(3);
        for n in 0..10 {
            history.push(snap(n));
        }
        assert_eq!(history.undo_len(), 3);
        assert_eq!(history.undo(snap(10)), Some(snap(9)));
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut history = UndoHistory::new(80);
        history.push(snap(0));
        let restored = history.undo(snap(1)).unwrap();
        assert_eq!(restored, snap(0));
        assert!(history.can_redo());
        let again = history.redo(restored).unwrap();
        assert_eq!(again, snap(1));
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_underflow_is_noop() {
        let mut history = UndoHistory::new(80);
        assert!(history.undo(snap(0)).is_none());
        assert!(history.redo(snap(0)).is_none());
        assert_eq!(history.redo_len(), 0);
    }

    #[test]
    fn test_new_push_clears_redo() {
        let mut history = UndoHistory::new(80);
        history.push(snap(0));
        history.undo(snap(1));
        history.push(snap(2));
        assert!(!history.can_redo());
    }
}
