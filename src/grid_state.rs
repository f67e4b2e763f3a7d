//! The explicit state object shared by all grid components.
//!
//! Components receive `&GridState` / `&mut GridState` and change it only
//! through the named update methods below; nothing here performs IO.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::data::cell_value::CellValue;
use crate::data::column::{Column, ColumnId, ColumnLayout, FieldPath};
use crate::data::row::{Row, RowId};
use crate::error::{GridError, GridResult};

/// Address of a single cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row_id: RowId,
    pub column_id: ColumnId,
}

impl CellRef {
    pub fn new(row_id: impl Into<String>, column_id: impl Into<String>) -> Self {
        Self {
            row_id: row_id.into(),
            column_id: column_id.into(),
        }
    }
}

/// The one live edit session of the grid
#[derive(Debug, Clone, PartialEq)]
pub struct EditingCell {
    pub cell: CellRef,
    /// A keystroke started the edit and replaced the value
    pub direct_typing: bool,
    /// The edit was started to clear a date
    pub clear_date_selection: bool,
    /// Current editor contents
    pub draft: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOperationKind {
    Add,
    Delete,
    Rename,
    Hide,
    Unhide,
    Reorder,
    Load,
    Reset,
    /// Undo/redo writing back a restored layout
    Restore,
}

impl ColumnOperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Hide => "hide",
            Self::Unhide => "unhide",
            Self::Reorder => "reorder",
            Self::Load => "load",
            Self::Reset => "reset",
            Self::Restore => "restore",
        }
    }
}

/// In-flight column operation marker; at most one exists at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnOperationLoading {
    pub kind: ColumnOperationKind,
    pub column_id: Option<ColumnId>,
}

#[derive(Debug, Clone)]
pub struct GridState {
    columns: ColumnLayout,
    rows: Vec<Row>,
    row_index: HashMap<RowId, usize>,
    selection: BTreeSet<RowId>,
    active_cell: Option<CellRef>,
    editing_cell: Option<EditingCell>,
    column_loading: Option<ColumnOperationLoading>,
    page_size: usize,
}

impl GridState {
    pub fn new(columns: ColumnLayout, rows: Vec<Row>) -> Self {
        let row_index = build_index(&rows);
        Self {
            columns,
            rows,
            row_index,
            selection: BTreeSet::new(),
            active_cell: None,
            editing_cell: None,
            column_loading: None,
            page_size: 100,
        }
    }

    // ----- columns -----

    pub fn columns(&self) -> &ColumnLayout {
        &self.columns
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.find(id)
    }

    pub fn replace_columns(&mut self, layout: ColumnLayout) {
        debug!(target: "grid_state", "Replacing column layout ({} visible, {} hidden)",
            layout.visible.len(), layout.hidden.len());
        self.columns = layout;
        self.drop_dangling_cell_refs();
    }

    pub fn column_loading(&self) -> Option<&ColumnOperationLoading> {
        self.column_loading.as_ref()
    }

    pub fn set_column_loading(&mut self, loading: Option<ColumnOperationLoading>) {
        self.column_loading = loading;
    }

    // ----- rows -----

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, id: &str) -> Option<&Row> {
        self.row_index.get(id).and_then(|&idx| self.rows.get(idx))
    }

    pub fn row_position(&self, id: &str) -> Option<usize> {
        self.row_index.get(id).copied()
    }

    /// Replace all rows (external import or reload)
    pub fn replace_rows(&mut self, rows: Vec<Row>) {
        self.row_index = build_index(&rows);
        self.rows = rows;
        let index = &self.row_index;
        self.selection.retain(|id| index.contains_key(id));
        self.drop_dangling_cell_refs();
    }

    /// Remove rows after an external deletion completed
    pub fn remove_rows(&mut self, ids: &BTreeSet<RowId>) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| !ids.contains(&r.id));
        self.row_index = build_index(&self.rows);
        self.selection.retain(|id| !ids.contains(id));
        self.drop_dangling_cell_refs();
        before - self.rows.len()
    }

    pub fn cell_value(&self, cell: &CellRef) -> Option<&CellValue> {
        let column = self.columns.find(&cell.column_id)?;
        let row = self.row(&cell.row_id)?;
        Some(row.get(&column.field_path()))
    }

    /// Write a cell, returning the previous value.
    pub fn set_cell_value(&mut self, cell: &CellRef, value: CellValue) -> GridResult<CellValue> {
        let column = self
            .columns
            .find(&cell.column_id)
            .ok_or_else(|| GridError::validation(format!("Unknown column '{}'", cell.column_id)))?;
        if !column.kind.accepts(&value) {
            return Err(GridError::validation(format!(
                "Value '{}' does not fit a {} column",
                value,
                column.kind.name()
            )));
        }
        let path = column.field_path();
        let idx = self
            .row_position(&cell.row_id)
            .ok_or_else(|| GridError::validation(format!("Unknown row '{}'", cell.row_id)))?;
        Ok(self.rows[idx].set(&path, value))
    }

    /// Set one field on many rows; returns the previous value of each touched row
    pub fn set_field_for_rows(
        &mut self,
        ids: &BTreeSet<RowId>,
        path: &FieldPath,
        value: &CellValue,
    ) -> Vec<(RowId, CellValue)> {
        let mut previous = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(&idx) = self.row_index.get(id) {
                let old = self.rows[idx].set(path, value.clone());
                previous.push((id.clone(), old));
            }
        }
        previous
    }

    /// Undo [`set_field_for_rows`](Self::set_field_for_rows)
    pub fn restore_field_values(&mut self, path: &FieldPath, previous: Vec<(RowId, CellValue)>) {
        for (id, value) in previous {
            if let Some(&idx) = self.row_index.get(&id) {
                self.rows[idx].set(path, value);
            }
        }
    }

    /// Restore a history snapshot
    pub fn restore_snapshot(&mut self, columns: ColumnLayout, rows: Vec<Row>) {
        self.columns = columns;
        self.replace_rows(rows);
    }

    // ----- selection -----

    pub fn selection(&self) -> &BTreeSet<RowId> {
        &self.selection
    }

    pub fn select_row(&mut self, id: &str) -> bool {
        if self.row_index.contains_key(id) {
            self.selection.insert(id.to_string())
        } else {
            false
        }
    }

    pub fn deselect_row(&mut self, id: &str) -> bool {
        self.selection.remove(id)
    }

    pub fn toggle_row(&mut self, id: &str) {
        if !self.deselect_row(id) {
            self.select_row(id);
        }
    }

    pub fn select_all(&mut self) {
        self.selection = self.rows.iter().map(|r| r.id.clone()).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ----- active / editing cell -----

    pub fn active_cell(&self) -> Option<&CellRef> {
        self.active_cell.as_ref()
    }

    pub fn set_active_cell(&mut self, cell: Option<CellRef>) {
        self.active_cell = cell;
    }

    pub fn editing_cell(&self) -> Option<&EditingCell> {
        self.editing_cell.as_ref()
    }

    pub fn set_editing_cell(&mut self, editing: Option<EditingCell>) {
        self.editing_cell = editing;
    }

    pub fn update_draft(&mut self, text: impl Into<String>) -> bool {
        match self.editing_cell.as_mut() {
            Some(editing) => {
                editing.draft = text.into();
                true
            }
            None => false,
        }
    }

    // ----- preferences -----

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
    }

    fn drop_dangling_cell_refs(&mut self) {
        let valid = |cell: &CellRef, rows: &HashMap<RowId, usize>, cols: &ColumnLayout| {
            rows.contains_key(&cell.row_id) && cols.visible_position(&cell.column_id).is_some()
        };
        if let Some(cell) = &self.active_cell {
            if !valid(cell, &self.row_index, &self.columns) {
                self.active_cell = None;
            }
        }
        if let Some(editing) = &self.editing_cell {
            if !valid(&editing.cell, &self.row_index, &self.columns) {
                self.editing_cell = None;
            }
        }
    }
}

fn build_index(rows: &[Row]) -> HashMap<RowId, usize> {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| (row.id.clone(), idx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::column::default_columns;

    fn state() -> GridState {
        let rows = (0..3)
            .map(|i| Row::new(format!("r{}", i)).with_field("company", CellValue::Text(format!("Co {}", i))))
            .collect();
        GridState::new(ColumnLayout::new(default_columns()), rows)
    }

    #[test]
    fn test_set_cell_value_checks_type() {
        let mut state = state();
        let cell = CellRef::new("r1", "deal_value");
        assert!(state.set_cell_value(&cell, CellValue::Text("lots".into())).is_err());

        let value = CellValue::Currency {
            amount: 10.0,
            code: "USD".into(),
        };
        let prev = state.set_cell_value(&cell, value.clone()).unwrap();
        assert_eq!(prev, CellValue::Empty);
        assert_eq!(state.cell_value(&cell), Some(&value));
    }

    #[test]
    fn test_unknown_row_is_validation_error() {
        let mut state = state();
        let err = state
            .set_cell_value(&CellRef::new("nope", "company"), CellValue::Text("x".into()))
            .unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));
    }

    #[test]
    fn test_replace_rows_prunes_selection_and_active_cell() {
        let mut state = state();
        state.select_row("r0");
        state.select_row("r2");
        state.set_active_cell(Some(CellRef::new("r2", "company")));

        state.replace_rows(vec![Row::new("r0")]);
        assert_eq!(state.selection().len(), 1);
        assert!(state.active_cell().is_none());
    }

    #[test]
    fn test_select_unknown_row_is_ignored() {
        let mut state = state();
        assert!(!state.select_row("missing"));
        state.toggle_row("r1");
        assert!(state.selection().contains("r1"));
        state.toggle_row("r1");
        assert!(state.selection().is_empty());
    }
}
