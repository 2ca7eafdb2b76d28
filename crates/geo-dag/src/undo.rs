//! A generic push/pop undo-redo stack, reused by `geo-command`'s
//! transaction manager for its own `Transaction` history.
//!
//! Mirrors the snapshot-stack pattern used throughout this codebase: every
//! commit is hashed and compared against the top of the undo stack so a
//! mutation that round-trips to a no-op doesn't bloat history, and any new
//! push clears the redo stack.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

const UNDO_HISTORY_MAX: usize = 256;

#[derive(Debug, Default)]
pub struct UndoEngine<S> {
    undo_stack: Vec<S>,
    redo_stack: Vec<S>,
    undo_snapshots_skipped: AtomicU64,
}

impl<S: Clone + PartialEq + Hash> UndoEngine<S> {
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            undo_snapshots_skipped: AtomicU64::new(0),
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn snapshots_skipped(&self) -> u64 {
        self.undo_snapshots_skipped.load(Ordering::Relaxed)
    }

    /// Commit `snapshot` as a new undo point, unless it's identical to the
    /// one already on top. Clears the redo stack, since a new edit
    /// invalidates any redo history.
    pub fn push_snapshot(&mut self, snapshot: S) {
        if self.undo_stack.last() == Some(&snapshot) {
            self.undo_snapshots_skipped.fetch_add(1, Ordering::Relaxed);
            trace!(target: "graph.undo", "snapshot_dedupe_skip");
            return;
        }
        self.redo_stack.clear();
        self.undo_stack.push(snapshot);
        if self.undo_stack.len() > UNDO_HISTORY_MAX {
            self.undo_stack.remove(0);
        }
        trace!(target: "graph.undo", depth = self.undo_stack.len(), "snapshot_push");
    }

    /// Pop the most recent undo point, pushing `current` onto the redo stack
    /// so a following `redo` can restore it. Returns the snapshot to restore.
    pub fn undo(&mut self, current: S) -> Option<S> {
        let previous = self.undo_stack.pop()?;
        self.redo_stack.push(current);
        trace!(target: "graph.undo", depth = self.undo_stack.len(), "undo");
        Some(previous)
    }

    pub fn redo(&mut self, current: S) -> Option<S> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push(current);
        trace!(target: "graph.undo", depth = self.undo_stack.len(), "redo");
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_undo_restores_previous_snapshot() {
        let mut engine: UndoEngine<i32> = UndoEngine::new();
        engine.push_snapshot(1);
        engine.push_snapshot(2);
        let restored = engine.undo(2).unwrap();
        assert_eq!(restored, 1);
    }

    #[test]
    fn dedupe_skips_identical_snapshot() {
        let mut engine: UndoEngine<i32> = UndoEngine::new();
        engine.push_snapshot(1);
        engine.push_snapshot(1);
        assert_eq!(engine.undo_depth(), 1);
        assert_eq!(engine.snapshots_skipped(), 1);
    }

    #[test]
    fn redo_cleared_after_new_edit() {
        let mut engine: UndoEngine<i32> = UndoEngine::new();
        engine.push_snapshot(1);
        engine.push_snapshot(2);
        engine.undo(2);
        assert_eq!(engine.redo_depth(), 1);
        engine.push_snapshot(3);
        assert_eq!(engine.redo_depth(), 0);
    }

    #[test]
    fn history_capped_at_max() {
        let mut engine: UndoEngine<i32> = UndoEngine::new();
        for i in 0..(UNDO_HISTORY_MAX as i32 + 10) {
            engine.push_snapshot(i);
        }
        assert_eq!(engine.undo_depth(), UNDO_HISTORY_MAX);
    }
}
