//! Host-facing entry point: owns the grid state, history and every component,
//! and routes input and persistence through them.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::KeyEvent;
use ratatui::layout::Rect;
use tracing::{debug, info, warn};

use crate::backend::{GridBackend, RowSource};
use crate::cell_renderer::{render_cell, RenderNode};
use crate::column_manager::ColumnLifecycleManager;
use crate::config::config::Config;
use crate::config::preferences::{GridPreferences, PreferencesStore};
use crate::data::cell_value::CellValue;
use crate::data::column::{default_columns, Column, ColumnId, ColumnType, NewColumnConfig};
use crate::data::row::{Row, RowId};
use crate::error::{GridError, GridResult};
use crate::grid_state::{CellRef, GridState};
use crate::history_manager::HistoryManager;
use crate::notifications::Notifier;
use crate::services::bulk_operations::{BulkMutation, BulkOperationCoordinator, RowDeleter};
use crate::services::filter_values::{FilterQueryTracker, FilterValueAggregator, FilterValueSet};
use crate::services::retry::{RetryConfig, RetryExecutor};
use crate::ui::cell_interaction::{
    CellInteractionController, CommitOutcome, EditTrigger, InteractionPhase, PendingCellSave,
};
use crate::ui::keyboard::{map_key, Direction, GridAction};
use crate::ui::virtualization::{RenderWindow, VirtualizationEngine};

/// Collaborators supplied by the host
#[derive(Clone)]
pub struct SessionServices {
    pub backend: Arc<dyn GridBackend>,
    pub row_source: Arc<dyn RowSource>,
    pub preferences: Arc<dyn PreferencesStore>,
    pub notifier: Arc<dyn Notifier>,
    pub deleter: Option<Arc<dyn RowDeleter>>,
}

/// One rendered row of the current window
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRow {
    pub row_id: RowId,
    pub cells: Vec<(ColumnId, RenderNode)>,
}

pub struct GridSession {
    state: GridState,
    history: HistoryManager,
    viewport: VirtualizationEngine,
    cells: CellInteractionController,
    columns: ColumnLifecycleManager,
    bulk: BulkOperationCoordinator,
    filters: FilterValueAggregator,
    filter_queries: FilterQueryTracker,
    preferences: Arc<dyn PreferencesStore>,
    notifier: Arc<dyn Notifier>,
    defaults: Vec<Column>,
}

impl GridSession {
    pub fn new(config: &Config, services: SessionServices, rows: Vec<Row>) -> Self {
        let notifier = services.notifier.clone();
        let retry = RetryExecutor::new(RetryConfig::from(&config.retry)).on_retry(move |attempt| {
            notifier.warning(&format!(
                "Connection problem, retrying ({}/{})",
                attempt.attempt + 1,
                attempt.max_attempts
            ));
        });

        let prefs = GridPreferences::load(&*services.preferences).unwrap_or_else(|e| {
            warn!(target: "grid_session", "Ignoring unreadable preferences: {}", e);
            GridPreferences::default()
        });
        let defaults = default_columns();
        let mut state = GridState::new(prefs.layout(&defaults), rows);
        state.set_page_size(prefs.page_size.unwrap_or(config.display.page_size));

        let viewport = VirtualizationEngine::new(state.row_count(), config.display.row_height)
            .with_overscan(config.display.overscan_rows, config.display.overscan_columns)
            .with_header_height(config.display.header_height);

        let mut bulk = BulkOperationCoordinator::new(services.backend.clone(), retry.clone());
        if let Some(deleter) = services.deleter {
            bulk = bulk.with_deleter(deleter);
        }

        let mut session = Self {
            cells: CellInteractionController::new(
                services.backend.clone(),
                retry.clone(),
                config.editing.clone(),
            ),
            columns: ColumnLifecycleManager::new(
                services.backend.clone(),
                services.preferences.clone(),
                retry,
            ),
            bulk,
            filters: FilterValueAggregator::new(services.row_source, config.filter.clone()),
            filter_queries: FilterQueryTracker::new(),
            history: HistoryManager::new(config.history.max_entries),
            viewport,
            state,
            preferences: services.preferences,
            notifier: services.notifier,
            defaults,
        };
        session.sync_columns();
        info!(target: "grid_session", "Session ready: {} rows, {} visible columns",
            session.state.row_count(), session.state.columns().visible.len());
        session
    }

    // ----- accessors -----

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn viewport(&self) -> &VirtualizationEngine {
        &self.viewport
    }

    pub fn cells(&self) -> &CellInteractionController {
        &self.cells
    }

    pub fn phase(&self) -> InteractionPhase {
        self.cells.phase(&self.state)
    }

    /// Shared tracker for hosts running filter scans on their own tasks
    pub fn filter_queries(&self) -> FilterQueryTracker {
        self.filter_queries.clone()
    }

    fn sync_columns(&mut self) {
        let layout = self.state.columns();
        let frozen: Vec<bool> = layout.visible.iter().map(|c| c.frozen).collect();
        self.viewport.set_columns(&layout.visible_widths(), &frozen);
    }

    fn sync_rows(&mut self) {
        self.viewport.set_row_count(self.state.row_count());
    }

    fn report<T>(&self, result: GridResult<T>) -> GridResult<T> {
        if let Err(err) = &result {
            self.notifier.error(&err.user_message());
        }
        result
    }

    // ----- viewport -----

    pub fn set_viewport(&mut self, width: u16, height: u16) {
        self.viewport.set_viewport(width as u32, height as u32);
        self.cells.set_viewport(Rect::new(0, 0, width, height));
    }

    pub fn scroll_to(&mut self, top: u32, left: u32) -> RenderWindow {
        self.viewport.scroll_to(top, left).clone()
    }

    pub fn window(&self) -> &RenderWindow {
        self.viewport.window()
    }

    /// Columns of the current window, frozen first
    pub fn window_columns(&self) -> Vec<&Column> {
        let visible = &self.state.columns().visible;
        self.viewport
            .window()
            .column_indices()
            .into_iter()
            .filter_map(|idx| visible.get(idx))
            .collect()
    }

    /// Render every cell of the current window
    pub fn render_window(&self) -> Vec<RenderedRow> {
        let columns = self.window_columns();
        let rows = self.state.rows();
        self.viewport
            .window()
            .rows
            .clone()
            .filter_map(|idx| rows.get(idx))
            .map(|row| RenderedRow {
                row_id: row.id.clone(),
                cells: columns
                    .iter()
                    .map(|column| (column.id.clone(), render_cell(column, row)))
                    .collect(),
            })
            .collect()
    }

    pub fn cell_rect(&self, cell: &CellRef) -> Option<Rect> {
        let row = self.state.row_position(&cell.row_id)?;
        let column = self.state.columns().visible_position(&cell.column_id)?;
        self.viewport.cell_rect(row, column)
    }

    // ----- cell interaction -----

    pub fn click(&mut self, cell: CellRef) {
        self.cells.click(&mut self.state, cell);
    }

    pub fn double_click(&mut self, cell: CellRef) -> GridResult<()> {
        self.start_edit(cell, EditTrigger::DoubleClick)
    }

    /// Pointer press at viewport coordinates; closes a popover when outside it
    pub fn pointer_down(&mut self, x: u16, y: u16) -> bool {
        self.cells.pointer_down(&mut self.state, x, y)
    }

    fn start_edit(&mut self, cell: CellRef, trigger: EditTrigger) -> GridResult<()> {
        let rect = self.cell_rect(&cell);
        let result = self.cells.start_edit(&mut self.state, cell, trigger, rect);
        self.report(result)
    }

    pub fn cancel_edit(&mut self) {
        self.cells.cancel_edit(&mut self.state);
    }

    pub fn set_draft(&mut self, text: &str) -> bool {
        self.state.update_draft(text)
    }

    pub async fn handle_key(&mut self, event: &KeyEvent, now: Instant) -> GridResult<()> {
        let Some(action) = map_key(event) else {
            return Ok(());
        };
        debug!(target: "grid_session", "Key action {:?}", action);
        let editing = self.state.editing_cell().map(|e| e.draft.clone());
        let active = self.state.active_cell().cloned();

        match (action, editing, active) {
            (GridAction::Undo, _, _) => {
                self.undo().await;
            }
            (GridAction::Redo, _, _) => {
                self.redo().await;
            }
            (GridAction::Escape, _, _) => self.cancel_edit(),
            (GridAction::Enter, Some(_), _) => {
                self.commit_edit(now).await?;
            }
            (GridAction::Enter, None, Some(cell)) => self.start_edit(cell, EditTrigger::Enter)?,
            (GridAction::Type(ch), Some(mut draft), _) => {
                draft.push(ch);
                self.state.update_draft(draft);
            }
            (GridAction::Type(ch), None, Some(cell)) => {
                self.start_edit(cell, EditTrigger::Keystroke(ch))?
            }
            (GridAction::Backspace, Some(mut draft), _) => {
                draft.pop();
                self.state.update_draft(draft);
            }
            (GridAction::Backspace | GridAction::Delete, None, Some(cell)) => {
                self.start_edit(cell, EditTrigger::Clear)?
            }
            (GridAction::Move(direction), None, _) => self.move_active(direction),
            _ => {}
        }
        Ok(())
    }

    fn move_active(&mut self, direction: Direction) {
        let columns = &self.state.columns().visible;
        if columns.is_empty() || self.state.row_count() == 0 {
            return;
        }
        let (row, col) = match self.state.active_cell() {
            Some(cell) => (
                self.state.row_position(&cell.row_id).unwrap_or(0),
                self.state.columns().visible_position(&cell.column_id).unwrap_or(0),
            ),
            None => (0, 0),
        };
        let (row, col) = match direction {
            Direction::Up => (row.saturating_sub(1), col),
            Direction::Down => ((row + 1).min(self.state.row_count() - 1), col),
            Direction::Left => (row, col.saturating_sub(1)),
            Direction::Right => (row, (col + 1).min(columns.len() - 1)),
        };
        let cell = CellRef::new(self.state.rows()[row].id.clone(), columns[col].id.clone());
        self.state.set_active_cell(Some(cell));
        self.viewport.ensure_row_visible(row);
    }

    /// Commit the live edit. `Ok(None)` when nothing was being edited or nothing changed.
    pub async fn commit_edit(&mut self, now: Instant) -> GridResult<Option<CommitOutcome>> {
        let result = self.cells.begin_commit(&mut self.state, &mut self.history, now);
        match self.report(result)? {
            Some(pending) => Ok(Some(self.save_cell(pending).await)),
            None => Ok(None),
        }
    }

    /// Commit a value picked in the open popover
    pub async fn choose_value(
        &mut self,
        value: CellValue,
        now: Instant,
    ) -> GridResult<Option<CommitOutcome>> {
        let result = self
            .cells
            .begin_commit_value(&mut self.state, &mut self.history, value, now);
        match self.report(result)? {
            Some(pending) => Ok(Some(self.save_cell(pending).await)),
            None => Ok(None),
        }
    }

    async fn save_cell(&mut self, pending: PendingCellSave) -> CommitOutcome {
        let result = self.cells.persist(&pending).await;
        let outcome = self
            .cells
            .finish_commit(&mut self.state, &mut self.history, pending, result);
        if let CommitOutcome::Reverted(err) = &outcome {
            self.notifier.error(&err.user_message());
        }
        outcome
    }

    /// Fire due scheduled tasks
    pub fn tick(&mut self, now: Instant) -> Option<CellRef> {
        self.cells.tick(now)
    }

    pub fn saved_indicator_remaining(&self, now: Instant) -> Option<Duration> {
        self.cells.saved_indicator_remaining(now)
    }

    // ----- history -----

    /// Step back one entry. A restored column layout is persisted; if that
    /// fails the step is reverted and `false` returned.
    pub async fn undo(&mut self) -> bool {
        self.step_history(true).await
    }

    pub async fn redo(&mut self) -> bool {
        self.step_history(false).await
    }

    async fn step_history(&mut self, backward: bool) -> bool {
        if let Err(err) = self.columns.ensure_idle(&self.state) {
            self.notifier.error(&err.user_message());
            return false;
        }
        self.cells.cancel_edit(&mut self.state);
        let layout_before = self.state.columns().clone();
        let stepped = if backward {
            self.history.undo(&mut self.state)
        } else {
            self.history.redo(&mut self.state)
        };
        let Some(label) = stepped else {
            return false;
        };

        let mut applied = true;
        if self.state.columns() != &layout_before {
            if let Err(err) = self.columns.persist_restored(&mut self.state).await {
                warn!(target: "grid_session", "Could not persist layout for '{}': {}", label, err);
                if backward {
                    self.history.redo(&mut self.state);
                } else {
                    self.history.undo(&mut self.state);
                }
                self.notifier.error(&err.user_message());
                applied = false;
            }
        }
        self.sync_columns();
        self.sync_rows();
        applied
    }

    // ----- columns -----

    pub async fn add_column(
        &mut self,
        after_id: Option<&str>,
        title: &str,
        kind: ColumnType,
        config: NewColumnConfig,
    ) -> GridResult<ColumnId> {
        let result = self
            .columns
            .add_column(&mut self.state, &mut self.history, after_id, title, kind, config)
            .await;
        self.sync_columns();
        self.report(result)
    }

    pub async fn delete_column(&mut self, id: &str) -> GridResult<()> {
        let result = self
            .columns
            .delete_column(&mut self.state, &mut self.history, id)
            .await;
        self.sync_columns();
        self.report(result)
    }

    pub async fn hide_column(&mut self, id: &str) -> GridResult<()> {
        let result = self
            .columns
            .hide_column(&mut self.state, &mut self.history, id)
            .await;
        self.sync_columns();
        self.report(result)
    }

    pub async fn unhide_column(&mut self, id: &str) -> GridResult<()> {
        let result = self
            .columns
            .unhide_column(&mut self.state, &mut self.history, id)
            .await;
        self.sync_columns();
        self.report(result)
    }

    pub async fn reorder_columns(&mut self, ordered_ids: &[ColumnId]) -> GridResult<()> {
        let result = self
            .columns
            .reorder_columns(&mut self.state, &mut self.history, ordered_ids)
            .await;
        self.sync_columns();
        self.report(result)
    }

    pub async fn rename_column(&mut self, id: &str, title: &str) -> GridResult<()> {
        let result = self
            .columns
            .rename_column(&mut self.state, &mut self.history, id, title)
            .await;
        self.report(result)
    }

    pub fn resize_column(&mut self, id: &str, width: u16) -> GridResult<u16> {
        let result = self.columns.resize_column(&mut self.state, id, width);
        self.sync_columns();
        self.report(result)
    }

    pub async fn load_layout(&mut self) -> GridResult<bool> {
        let result = self.columns.load_layout(&mut self.state).await;
        self.sync_columns();
        self.report(result)
    }

    pub async fn reset_columns(&mut self) -> GridResult<()> {
        let result = self
            .columns
            .reset_to_defaults(&mut self.state, &mut self.history, &self.defaults)
            .await;
        self.sync_columns();
        self.report(result)
    }

    // ----- selection and bulk operations -----

    pub fn select_row(&mut self, id: &str) -> bool {
        self.state.select_row(id)
    }

    pub fn toggle_row(&mut self, id: &str) {
        self.state.toggle_row(id);
    }

    pub fn select_all(&mut self) {
        self.state.select_all();
    }

    pub fn clear_selection(&mut self) {
        self.state.clear_selection();
    }

    /// Apply `mutation` to the selection; returns the number of affected rows
    pub async fn bulk_update(&mut self, mutation: BulkMutation) -> GridResult<usize> {
        let result = match mutation {
            BulkMutation::Delete => match self.bulk.delete_selected(&mut self.state).await {
                Ok(ids) => {
                    let removed: BTreeSet<RowId> = ids.into_iter().collect();
                    let count = self.state.remove_rows(&removed);
                    self.history.clear();
                    self.sync_rows();
                    Ok(count)
                }
                Err(err) => Err(err),
            },
            _ => {
                self.bulk
                    .update_selected(&mut self.state, &mut self.history, &mutation)
                    .await
            }
        };
        if let Ok(count) = &result {
            self.notifier.success(&format!("Updated {} row(s)", count));
        }
        self.report(result)
    }

    // ----- filters -----

    /// Distinct values of `column_id`.
    ///
    /// A failed scan is reported and yields an empty set; `None` means a newer
    /// query was issued while this one ran.
    pub async fn filter_values(&self, column_id: &str) -> Option<FilterValueSet> {
        let ticket = self.filter_queries.issue();
        let set = match self.filters.collect(self.state.columns(), column_id).await {
            Ok(set) => set,
            Err(err) => {
                self.notifier.error(&err.user_message());
                FilterValueSet::empty(column_id)
            }
        };
        self.filter_queries.accept(ticket, set)
    }

    // ----- preferences -----

    pub fn set_page_size(&mut self, page_size: usize) -> GridResult<()> {
        self.state.set_page_size(page_size);
        GridPreferences::save_page_size(&*self.preferences, self.state.page_size())
            .map_err(|e| GridError::terminal(format!("Could not save page size: {}", e)))
    }
}
