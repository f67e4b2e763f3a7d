//! Cell focus/edit state machine.
//!
//! `Idle -> Active (click) -> Editing (double-click / Enter / keystroke)`, then
//! commit or cancel back to `Active`. Commits apply optimistically, show a
//! short-lived "saved" indicator and persist in the background; a failed save
//! reverts the cell unless a newer edit of the same cell has been issued since.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ratatui::layout::Rect;
use tracing::{debug, info, warn};

use crate::backend::GridBackend;
use crate::config::config::{EditingConfig, PopoverSize};
use crate::data::cell_value::CellValue;
use crate::data::column::{EditMode, FieldPath, PopoverKind};
use crate::error::{GridError, GridResult};
use crate::grid_state::{CellRef, EditingCell, GridState};
use crate::history_manager::{HistoryManager, SnapshotId};
use crate::scheduled_task::ScheduledTask;
use crate::services::retry::RetryExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionPhase {
    Idle,
    Active,
    Editing,
}

/// What started an edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTrigger {
    DoubleClick,
    Enter,
    /// A printable key pressed on the active cell
    Keystroke(char),
    /// Backspace/Delete on the active cell
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopoverSide {
    Below,
    Above,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopoverPlacement {
    pub area: Rect,
    pub side: PopoverSide,
}

/// Position a popover of `size` against `anchor` inside `viewport`.
///
/// Opens below the anchor unless the space under it is smaller than the
/// popover height plus `margin`, in which case it flips above. Horizontally
/// it is centered on the anchor and kept `margin` pixels inside both edges.
pub fn compute_popover_placement(
    anchor: Rect,
    size: PopoverSize,
    viewport: Rect,
    margin: u16,
) -> PopoverPlacement {
    let space_below = viewport.bottom().saturating_sub(anchor.bottom());
    let needed = size.height.saturating_add(margin);
    let (side, y) = if space_below < needed {
        (PopoverSide::Above, anchor.y.saturating_sub(size.height).max(viewport.y))
    } else {
        (PopoverSide::Below, anchor.bottom())
    };

    let centered = anchor.x as i32 + anchor.width as i32 / 2 - size.width as i32 / 2;
    let min_x = viewport.x as i32 + margin as i32;
    let max_x = viewport.right() as i32 - margin as i32 - size.width as i32;
    let x = if max_x < min_x {
        min_x
    } else {
        centered.clamp(min_x, max_x)
    };

    PopoverPlacement {
        area: Rect::new(x.max(0) as u16, y, size.width, size.height),
        side,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPopover {
    pub cell: CellRef,
    pub kind: PopoverKind,
    /// `None` when the host did not supply the cell's on-screen position
    pub placement: Option<PopoverPlacement>,
}

/// An optimistic cell write awaiting its backend acknowledgement
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCellSave {
    pub cell: CellRef,
    pub field: FieldPath,
    pub value: CellValue,
    pub previous: CellValue,
    pub seq: u64,
    /// History entry taken before the write
    pub snapshot: SnapshotId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Saved,
    /// The save failed and the previous value was restored
    Reverted(GridError),
    /// A newer edit of the same cell exists; this acknowledgement was ignored
    Superseded,
}

pub struct CellInteractionController {
    backend: Arc<dyn GridBackend>,
    retry: RetryExecutor,
    config: EditingConfig,
    viewport: Rect,
    popover: Option<OpenPopover>,
    saved_indicator: ScheduledTask<CellRef>,
    latest_seq: HashMap<CellRef, u64>,
    next_seq: u64,
}

impl CellInteractionController {
    pub fn new(backend: Arc<dyn GridBackend>, retry: RetryExecutor, config: EditingConfig) -> Self {
        let indicator = ScheduledTask::from_millis(config.saved_indicator_ms);
        Self {
            backend,
            retry,
            config,
            viewport: Rect::default(),
            popover: None,
            saved_indicator: indicator,
            latest_seq: HashMap::new(),
            next_seq: 1,
        }
    }

    pub fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
    }

    pub fn phase(&self, state: &GridState) -> InteractionPhase {
        if state.editing_cell().is_some() {
            InteractionPhase::Editing
        } else if state.active_cell().is_some() {
            InteractionPhase::Active
        } else {
            InteractionPhase::Idle
        }
    }

    pub fn popover(&self) -> Option<&OpenPopover> {
        self.popover.as_ref()
    }

    /// Cell currently showing the "saved" indicator
    pub fn saved_indicator(&self) -> Option<&CellRef> {
        self.saved_indicator.pending()
    }

    /// Focus a cell. Clicking away from a live edit cancels it.
    pub fn click(&mut self, state: &mut GridState, cell: CellRef) {
        let editing_elsewhere = state
            .editing_cell()
            .map(|e| e.cell != cell)
            .unwrap_or(false);
        if editing_elsewhere {
            self.cancel_edit(state);
        }
        state.set_active_cell(Some(cell));
    }

    /// Pointer press at viewport coordinates; closes the popover when outside it.
    /// Returns `true` when a popover was closed.
    pub fn pointer_down(&mut self, state: &mut GridState, x: u16, y: u16) -> bool {
        let outside = match self.popover.as_ref().and_then(|p| p.placement) {
            Some(placement) => !contains(placement.area, x, y),
            None => false,
        };
        if outside {
            self.cancel_edit(state);
        }
        outside
    }

    /// Enter edit mode on `cell`. `cell_rect` is its on-screen box, used to place popovers.
    pub fn start_edit(
        &mut self,
        state: &mut GridState,
        cell: CellRef,
        trigger: EditTrigger,
        cell_rect: Option<Rect>,
    ) -> GridResult<()> {
        let column = state
            .column(&cell.column_id)
            .ok_or_else(|| GridError::validation(format!("Unknown column '{}'", cell.column_id)))?;
        if !column.editable {
            return Err(GridError::validation(format!("'{}' is read-only", column.title)));
        }
        let current = state
            .cell_value(&cell)
            .ok_or_else(|| GridError::validation(format!("Unknown row '{}'", cell.row_id)))?;
        let mode = column.kind.edit_mode();
        let direct = column.kind.supports_direct_typing();

        let (direct_typing, clear_date_selection, draft) = match (trigger, mode) {
            (EditTrigger::Keystroke(ch), _) if direct => (true, false, ch.to_string()),
            (EditTrigger::Keystroke(ch), _) => (false, false, ch.to_string()),
            (EditTrigger::Clear, EditMode::Popover(PopoverKind::DatePicker)) => {
                (false, true, String::new())
            }
            (EditTrigger::Clear, _) => (direct, false, String::new()),
            _ => (false, false, current.to_string()),
        };

        if state.editing_cell().is_some() {
            self.cancel_edit(state);
        }
        self.saved_indicator.cancel_if(|c| *c == cell);

        self.popover = match mode {
            EditMode::Popover(kind) => {
                let size = match kind {
                    PopoverKind::DatePicker => self.config.date_popover,
                    PopoverKind::Select => self.config.select_popover,
                };
                let placement = cell_rect.map(|anchor| {
                    compute_popover_placement(anchor, size, self.viewport, self.config.popover_margin)
                });
                Some(OpenPopover {
                    cell: cell.clone(),
                    kind,
                    placement,
                })
            }
            EditMode::Inline => None,
        };

        debug!(target: "cell_edit", "Editing {}/{} ({:?})", cell.row_id, cell.column_id, trigger);
        state.set_active_cell(Some(cell.clone()));
        state.set_editing_cell(Some(EditingCell {
            cell,
            direct_typing,
            clear_date_selection,
            draft,
        }));
        Ok(())
    }

    /// Leave edit mode without writing; the cell stays active
    pub fn cancel_edit(&mut self, state: &mut GridState) {
        if let Some(editing) = state.editing_cell() {
            debug!(target: "cell_edit", "Cancelled edit of {}/{}",
                editing.cell.row_id, editing.cell.column_id);
        }
        state.set_editing_cell(None);
        self.popover = None;
    }

    /// Parse the editor draft and apply it optimistically.
    ///
    /// Returns `Ok(None)` when nothing changed. Invalid input keeps the editor open.
    pub fn begin_commit(
        &mut self,
        state: &mut GridState,
        history: &mut HistoryManager,
        now: Instant,
    ) -> GridResult<Option<PendingCellSave>> {
        let Some(editing) = state.editing_cell().cloned() else {
            return Ok(None);
        };
        let column = state
            .column(&editing.cell.column_id)
            .ok_or_else(|| GridError::validation("Edited column no longer exists"))?;
        let value = column.kind.parse_input(&editing.draft)?;
        self.begin_commit_value(state, history, value, now)
    }

    /// Apply a value picked in a popover (or parsed from the draft)
    pub fn begin_commit_value(
        &mut self,
        state: &mut GridState,
        history: &mut HistoryManager,
        value: CellValue,
        now: Instant,
    ) -> GridResult<Option<PendingCellSave>> {
        let Some(editing) = state.editing_cell().cloned() else {
            return Ok(None);
        };
        let cell = editing.cell;
        let column = state
            .column(&cell.column_id)
            .ok_or_else(|| GridError::validation("Edited column no longer exists"))?;
        if !column.kind.accepts(&value) {
            return Err(GridError::validation(format!(
                "Value '{}' does not fit a {} column",
                value,
                column.kind.name()
            )));
        }
        let field = column.field_path();

        if state.cell_value(&cell) == Some(&value) {
            self.cancel_edit(state);
            return Ok(None);
        }

        let snapshot = history.snapshot(state, &format!("edit {}", cell.column_id));
        let previous = match state.set_cell_value(&cell, value.clone()) {
            Ok(previous) => previous,
            Err(err) => {
                history.discard(snapshot);
                return Err(err);
            }
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.latest_seq.insert(cell.clone(), seq);
        self.saved_indicator.schedule(cell.clone(), now);
        state.set_editing_cell(None);
        self.popover = None;

        info!(target: "cell_edit", "Committed {}/{} = '{}' (edit #{})",
            cell.row_id, cell.column_id, value, seq);
        Ok(Some(PendingCellSave {
            cell,
            field,
            value,
            previous,
            seq,
            snapshot,
        }))
    }

    pub async fn persist(&self, pending: &PendingCellSave) -> GridResult<()> {
        self.retry
            .execute("save cell", || {
                self.backend
                    .save_cell(&pending.cell.row_id, &pending.field, &pending.value)
            })
            .await
    }

    pub fn is_latest(&self, pending: &PendingCellSave) -> bool {
        self.latest_seq.get(&pending.cell) == Some(&pending.seq)
    }

    /// Apply a backend acknowledgement.
    ///
    /// A failed save never survives in history: its own entry is dropped and
    /// later entries holding the rejected value get the previous one back.
    pub fn finish_commit(
        &mut self,
        state: &mut GridState,
        history: &mut HistoryManager,
        pending: PendingCellSave,
        result: GridResult<()>,
    ) -> CommitOutcome {
        if result.is_err() {
            history.replace_cell_after(
                pending.snapshot,
                &pending.cell.row_id,
                &pending.field,
                &pending.value,
                &pending.previous,
            );
            history.discard(pending.snapshot);
        }
        if !self.is_latest(&pending) {
            debug!(target: "cell_edit", "Ignoring acknowledgement of stale edit #{} for {}/{}",
                pending.seq, pending.cell.row_id, pending.cell.column_id);
            return CommitOutcome::Superseded;
        }
        self.latest_seq.remove(&pending.cell);

        match result {
            Ok(()) => CommitOutcome::Saved,
            Err(err) => {
                warn!(target: "cell_edit", "Save of {}/{} failed, reverting: {}",
                    pending.cell.row_id, pending.cell.column_id, err);
                self.saved_indicator.cancel_if(|c| *c == pending.cell);
                if let Err(revert_err) = state.set_cell_value(&pending.cell, pending.previous) {
                    debug!(target: "cell_edit", "Could not revert {}/{}: {}",
                        pending.cell.row_id, pending.cell.column_id, revert_err);
                }
                CommitOutcome::Reverted(err)
            }
        }
    }

    /// Time until the "saved" indicator clears
    pub fn saved_indicator_remaining(&self, now: Instant) -> Option<Duration> {
        self.saved_indicator.time_remaining(now)
    }

    /// Fire due scheduled tasks; returns the cell whose indicator just cleared
    pub fn tick(&mut self, now: Instant) -> Option<CellRef> {
        self.saved_indicator.poll(now)
    }
}

fn contains(area: Rect, x: u16, y: u16) -> bool {
    x >= area.x && x < area.right() && y >= area.y && y < area.bottom()
}
