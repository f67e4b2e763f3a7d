use std::collections::VecDeque;

use chrono::{DateTime, Local};
use tracing::debug;

use crate::data::cell_value::CellValue;
use crate::data::column::{ColumnLayout, FieldPath};
use crate::data::row::Row;
use crate::grid_state::GridState;

pub type SnapshotId = u64;

/// Immutable copy of the grid taken before a mutating action
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: SnapshotId,
    pub label: String,
    pub timestamp: DateTime<Local>,
    pub columns: ColumnLayout,
    pub rows: Vec<Row>,
}

/// Linear undo/redo over full (columns, rows) snapshots
pub struct HistoryManager {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_entries: usize,
    next_id: SnapshotId,
}

impl HistoryManager {
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
            next_id: 1,
        }
    }

    fn capture(&mut self, state: &GridState, label: &str) -> HistoryEntry {
        let id = self.next_id;
        self.next_id += 1;
        HistoryEntry {
            id,
            label: label.to_string(),
            timestamp: Local::now(),
            columns: state.columns().clone(),
            rows: state.rows().to_vec(),
        }
    }

    /// Record the current state before `label` mutates it.
    ///
    /// Clears the redo stack; the oldest entry is dropped past `max_entries`.
    pub fn snapshot(&mut self, state: &GridState, label: &str) -> SnapshotId {
        let entry = self.capture(state, label);
        let id = entry.id;
        self.undo_stack.push_back(entry);
        if self.undo_stack.len() > self.max_entries {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
        debug!(target: "history", "Snapshot #{} before '{}' ({} undo entries)",
            id, label, self.undo_stack.len());
        id
    }

    /// Remove a snapshot whose action was rolled back
    pub fn discard(&mut self, id: SnapshotId) -> bool {
        match self.undo_stack.iter().position(|e| e.id == id) {
            Some(pos) => {
                self.undo_stack.remove(pos);
                debug!(target: "history", "Discarded snapshot #{}", id);
                true
            }
            None => false,
        }
    }

    /// Entries on either stack captured after `since`
    fn entries_after(&mut self, since: SnapshotId) -> impl Iterator<Item = &mut HistoryEntry> {
        self.undo_stack
            .iter_mut()
            .chain(self.redo_stack.iter_mut())
            .filter(move |e| e.id > since)
    }

    /// Put `restored` back into every entry captured after `since` that still
    /// holds the `rejected` value of a cell. Returns the number of entries changed.
    pub fn replace_cell_after(
        &mut self,
        since: SnapshotId,
        row_id: &str,
        field: &FieldPath,
        rejected: &CellValue,
        restored: &CellValue,
    ) -> usize {
        let mut changed = 0;
        for entry in self.entries_after(since) {
            if let Some(row) = entry.rows.iter_mut().find(|r| r.id == row_id) {
                if row.get(field) == rejected {
                    row.set(field, restored.clone());
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            debug!(target: "history", "Rewrote {}/{} in {} later snapshot(s)",
                row_id, field.key(), changed);
        }
        changed
    }

    /// Layout counterpart of [`replace_cell_after`](Self::replace_cell_after)
    pub fn replace_columns_after(
        &mut self,
        since: SnapshotId,
        rejected: &ColumnLayout,
        restored: &ColumnLayout,
    ) -> usize {
        let mut changed = 0;
        for entry in self.entries_after(since) {
            if &entry.columns == rejected {
                entry.columns = restored.clone();
                changed += 1;
            }
        }
        if changed > 0 {
            debug!(target: "history", "Rewrote column layout in {} later snapshot(s)", changed);
        }
        changed
    }

    /// Restore the latest snapshot; returns its label
    pub fn undo(&mut self, state: &mut GridState) -> Option<String> {
        let entry = self.undo_stack.pop_back()?;
        let current = self.capture(state, &entry.label);
        self.redo_stack.push(current);
        debug!(target: "history", "Undo '{}'", entry.label);
        state.restore_snapshot(entry.columns, entry.rows);
        Some(entry.label)
    }

    pub fn redo(&mut self, state: &mut GridState) -> Option<String> {
        let entry = self.redo_stack.pop()?;
        let current = self.capture(state, &entry.label);
        self.undo_stack.push_back(current);
        debug!(target: "history", "Redo '{}'", entry.label);
        state.restore_snapshot(entry.columns, entry.rows);
        Some(entry.label)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Label of the action the next undo reverts
    pub fn peek_undo(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.label.as_str())
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cell_value::CellValue;
    use crate::data::column::default_columns;
    use crate::grid_state::CellRef;

    fn state() -> GridState {
        GridState::new(
            ColumnLayout::new(default_columns()),
            vec![Row::new("r1").with_field("company", CellValue::Text("Acme".into()))],
        )
    }

    fn edit(history: &mut HistoryManager, state: &mut GridState, text: &str) {
        history.snapshot(state, "edit");
        state
            .set_cell_value(&CellRef::new("r1", "company"), CellValue::Text(text.into()))
            .unwrap();
    }

    fn company(state: &GridState) -> CellValue {
        state
            .cell_value(&CellRef::new("r1", "company"))
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut state = state();
        let mut history = HistoryManager::default();
        edit(&mut history, &mut state, "Globex");

        assert_eq!(history.undo(&mut state).as_deref(), Some("edit"));
        assert_eq!(company(&state), CellValue::Text("Acme".into()));
        assert!(history.can_redo());

        history.redo(&mut state);
        assert_eq!(company(&state), CellValue::Text("Globex".into()));
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_new_snapshot_clears_redo() {
        let mut state = state();
        let mut history = HistoryManager::default();
        edit(&mut history, &mut state, "A");
        history.undo(&mut state);
        edit(&mut history, &mut state, "B");
        assert!(!history.can_redo());
        assert_eq!(history.redo(&mut state), None);
    }

    #[test]
    fn test_cap_drops_oldest() {
        let mut state = state();
        let mut history = HistoryManager::new(2);
        for text in ["A", "B", "C"] {
            edit(&mut history, &mut state, text);
        }
        assert_eq!(history.undo_len(), 2);
        history.undo(&mut state);
        history.undo(&mut state);
        assert_eq!(company(&state), CellValue::Text("A".into()));
        assert_eq!(history.undo(&mut state), None);
    }

    #[test]
    fn test_replace_cell_after_skips_earlier_and_changed_entries() {
        let mut state = state();
        let mut history = HistoryManager::default();
        let cell = CellRef::new("r1", "company");
        let field = FieldPath::Standard("company".into());

        let before = history.snapshot(&state, "edit");
        state.set_cell_value(&cell, CellValue::Text("Rejected".into())).unwrap();
        edit(&mut history, &mut state, "Later");
        edit(&mut history, &mut state, "Final");

        let rejected = CellValue::Text("Rejected".into());
        let restored = CellValue::Text("Acme".into());
        assert_eq!(history.replace_cell_after(before, "r1", &field, &rejected, &restored), 1);
        assert!(history.discard(before));

        history.undo(&mut state);
        assert_eq!(company(&state), CellValue::Text("Later".into()));
        history.undo(&mut state);
        assert_eq!(company(&state), restored);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_discard_removes_only_that_entry() {
        let mut state = state();
        let mut history = HistoryManager::default();
        let first = history.snapshot(&state, "one");
        let second = history.snapshot(&state, "two");
        assert!(history.discard(first));
        assert!(!history.discard(first));
        assert_eq!(history.peek_undo(), Some("two"));
        assert!(history.discard(second));
        assert!(!history.can_undo());
    }
}
