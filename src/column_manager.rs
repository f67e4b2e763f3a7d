//! Column add/delete/hide/unhide/reorder/rename with optimistic apply and rollback.
//!
//! Every persisted operation runs in three steps so that hosts can drive the
//! async part themselves:
//! 1. `begin_*` validates, snapshots history, applies the new layout and takes
//!    the column-operation lock (a second `begin_*` fails fast)
//! 2. [`ColumnLifecycleManager::persist`] writes the layout through the retry executor
//! 3. [`ColumnLifecycleManager::finish`] releases the lock and rolls back on failure
//!
//! The `async` convenience methods run all three in sequence.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::GridBackend;
use crate::config::preferences::{GridPreferences, PreferencesStore};
use crate::data::column::{
    is_protected, Column, ColumnId, ColumnLayout, ColumnType, NewColumnConfig, MAX_COLUMN_WIDTH,
    MIN_COLUMN_WIDTH,
};
use crate::error::{GridError, GridResult};
use crate::grid_state::{ColumnOperationKind, ColumnOperationLoading, GridState};
use crate::history_manager::{HistoryManager, SnapshotId};
use crate::services::retry::{DataResult, RetryExecutor};

/// A column operation applied locally and awaiting persistence
#[derive(Debug, Clone)]
pub struct PendingColumnOperation {
    pub kind: ColumnOperationKind,
    pub column_id: Option<ColumnId>,
    previous: ColumnLayout,
    layout: ColumnLayout,
    snapshot: SnapshotId,
}

impl PendingColumnOperation {
    /// The layout that will be persisted
    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }
}

pub struct ColumnLifecycleManager {
    backend: Arc<dyn GridBackend>,
    preferences: Arc<dyn PreferencesStore>,
    retry: RetryExecutor,
}

impl ColumnLifecycleManager {
    pub fn new(
        backend: Arc<dyn GridBackend>,
        preferences: Arc<dyn PreferencesStore>,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            backend,
            preferences,
            retry,
        }
    }

    /// Fails with a concurrency error while a column operation is in flight
    pub fn ensure_idle(&self, state: &GridState) -> GridResult<()> {
        match state.column_loading() {
            Some(loading) => Err(GridError::concurrency(format!(
                "A column {} is already in progress",
                loading.kind.label()
            ))),
            None => Ok(()),
        }
    }

    fn start(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        kind: ColumnOperationKind,
        column_id: Option<ColumnId>,
        layout: ColumnLayout,
    ) -> PendingColumnOperation {
        let label = match &column_id {
            Some(id) => format!("{} column {}", kind.label(), id),
            None => format!("{} columns", kind.label()),
        };
        let snapshot = history.snapshot(state, &label);
        let previous = state.columns().clone();
        state.replace_columns(layout.clone());
        state.set_column_loading(Some(ColumnOperationLoading {
            kind,
            column_id: column_id.clone(),
        }));
        info!(target: "column_manager", "Started {}", label);
        PendingColumnOperation {
            kind,
            column_id,
            previous,
            layout,
            snapshot,
        }
    }

    /// Pick an id derived from `title` that no live or deleted column uses
    pub fn fresh_id(layout: &ColumnLayout, title: &str) -> ColumnId {
        let mut slug = String::new();
        for ch in title.trim().to_lowercase().chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch);
            } else if !slug.ends_with('_') {
                slug.push('_');
            }
        }
        let slug = slug.trim_matches('_');
        let base = if slug.is_empty() { "column" } else { slug };

        let mut candidate = base.to_string();
        let mut n = 2;
        while layout.id_in_use(&candidate) || is_protected(&candidate) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        candidate
    }

    pub fn begin_add(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        after_id: Option<&str>,
        title: &str,
        kind: ColumnType,
        config: NewColumnConfig,
    ) -> GridResult<PendingColumnOperation> {
        self.ensure_idle(state)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(GridError::validation("Column title cannot be empty"));
        }
        let position = match after_id {
            Some(after) => state
                .columns()
                .visible_position(after)
                .map(|p| p + 1)
                .ok_or_else(|| GridError::validation(format!("Unknown column '{}'", after)))?,
            None => state.columns().visible.len(),
        };

        let mut layout = state.columns().clone();
        let id = Self::fresh_id(&layout, title);
        let mut column = Column::new(id.clone(), title, kind)
            .with_width(config.width.clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH))
            .custom();
        column.editable = config.editable;
        column.frozen = config.frozen;
        layout.visible.insert(position, column);

        Ok(self.start(state, history, ColumnOperationKind::Add, Some(id), layout))
    }

    pub fn begin_delete(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        id: &str,
    ) -> GridResult<PendingColumnOperation> {
        self.ensure_idle(state)?;
        if is_protected(id) {
            return Err(GridError::validation(format!(
                "Column '{}' is required and cannot be deleted",
                id
            )));
        }
        let mut layout = state.columns().clone();
        if let Some(pos) = layout.visible_position(id) {
            layout.visible.remove(pos);
        } else if let Some(pos) = layout.hidden_position(id) {
            layout.hidden.remove(pos);
        } else {
            return Err(GridError::validation(format!("Unknown column '{}'", id)));
        }
        layout.deleted.insert(id.to_string());

        Ok(self.start(state, history, ColumnOperationKind::Delete, Some(id.to_string()), layout))
    }

    pub fn begin_hide(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        id: &str,
    ) -> GridResult<PendingColumnOperation> {
        self.ensure_idle(state)?;
        let mut layout = state.columns().clone();
        let pos = layout
            .visible_position(id)
            .ok_or_else(|| GridError::validation(format!("Column '{}' is not visible", id)))?;
        if layout.visible.len() == 1 {
            return Err(GridError::validation("At least one column must stay visible"));
        }
        let column = layout.visible.remove(pos);
        layout.hidden.push(column);

        Ok(self.start(state, history, ColumnOperationKind::Hide, Some(id.to_string()), layout))
    }

    pub fn begin_unhide(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        id: &str,
    ) -> GridResult<PendingColumnOperation> {
        self.ensure_idle(state)?;
        let mut layout = state.columns().clone();
        let pos = layout
            .hidden_position(id)
            .ok_or_else(|| GridError::validation(format!("Column '{}' is not hidden", id)))?;
        let column = layout.hidden.remove(pos);
        layout.visible.push(column);

        Ok(self.start(state, history, ColumnOperationKind::Unhide, Some(id.to_string()), layout))
    }

    /// `ordered_ids` must be exactly a permutation of the visible ids
    pub fn begin_reorder(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        ordered_ids: &[ColumnId],
    ) -> GridResult<PendingColumnOperation> {
        self.ensure_idle(state)?;
        let current = state.columns().visible_ids();
        let requested: BTreeSet<&str> = ordered_ids.iter().map(String::as_str).collect();
        let existing: BTreeSet<&str> = current.iter().map(String::as_str).collect();
        if ordered_ids.len() != current.len()
            || requested.len() != ordered_ids.len()
            || requested != existing
        {
            return Err(GridError::validation(
                "Column order must list every visible column exactly once",
            ));
        }

        let mut layout = state.columns().clone();
        let mut reordered = Vec::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            if let Some(column) = layout.find(id) {
                reordered.push(column.clone());
            }
        }
        layout.visible = reordered;

        Ok(self.start(state, history, ColumnOperationKind::Reorder, None, layout))
    }

    pub fn begin_rename(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        id: &str,
        title: &str,
    ) -> GridResult<PendingColumnOperation> {
        self.ensure_idle(state)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(GridError::validation("Column title cannot be empty"));
        }
        let mut layout = state.columns().clone();
        let column = layout
            .find_mut(id)
            .ok_or_else(|| GridError::validation(format!("Unknown column '{}'", id)))?;
        column.title = title.to_string();

        Ok(self.start(state, history, ColumnOperationKind::Rename, Some(id.to_string()), layout))
    }

    /// Restore `defaults`, minus every deleted id
    pub fn begin_reset(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        defaults: &[Column],
    ) -> GridResult<PendingColumnOperation> {
        self.ensure_idle(state)?;
        let layout = ColumnLayout::from_defaults(defaults, state.columns().deleted.clone());
        Ok(self.start(state, history, ColumnOperationKind::Reset, None, layout))
    }

    pub async fn persist(&self, pending: &PendingColumnOperation) -> GridResult<()> {
        let label = format!("{} column layout", pending.kind.label());
        self.retry
            .execute(&label, || self.backend.save_column_layout(&pending.layout))
            .await
    }

    /// Release the lock; on failure restore the previous layout and scrub it from history
    pub fn finish(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        pending: PendingColumnOperation,
        result: GridResult<()>,
    ) -> GridResult<()> {
        state.set_column_loading(None);
        match result {
            Ok(()) => {
                info!(target: "column_manager", "Column {} saved", pending.kind.label());
                self.save_preferences(state.columns());
                Ok(())
            }
            Err(err) => {
                warn!(target: "column_manager", "Column {} failed, rolling back: {}",
                    pending.kind.label(), err);
                history.replace_columns_after(pending.snapshot, &pending.layout, &pending.previous);
                history.discard(pending.snapshot);
                state.replace_columns(pending.previous);
                Err(err)
            }
        }
    }

    async fn complete(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        pending: PendingColumnOperation,
    ) -> GridResult<()> {
        let result = self.persist(&pending).await;
        self.finish(state, history, pending, result)
    }

    /// Insert a column after `after_id` (or at the end); returns the new id
    pub async fn add_column(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        after_id: Option<&str>,
        title: &str,
        kind: ColumnType,
        config: NewColumnConfig,
    ) -> GridResult<ColumnId> {
        let pending = self.begin_add(state, history, after_id, title, kind, config)?;
        let id = pending.column_id.clone().unwrap_or_default();
        self.complete(state, history, pending).await?;
        Ok(id)
    }

    pub async fn delete_column(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        id: &str,
    ) -> GridResult<()> {
        let pending = self.begin_delete(state, history, id)?;
        self.complete(state, history, pending).await
    }

    pub async fn hide_column(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        id: &str,
    ) -> GridResult<()> {
        let pending = self.begin_hide(state, history, id)?;
        self.complete(state, history, pending).await
    }

    pub async fn unhide_column(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        id: &str,
    ) -> GridResult<()> {
        let pending = self.begin_unhide(state, history, id)?;
        self.complete(state, history, pending).await
    }

    pub async fn reorder_columns(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        ordered_ids: &[ColumnId],
    ) -> GridResult<()> {
        let pending = self.begin_reorder(state, history, ordered_ids)?;
        self.complete(state, history, pending).await
    }

    pub async fn rename_column(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        id: &str,
        title: &str,
    ) -> GridResult<()> {
        let pending = self.begin_rename(state, history, id, title)?;
        self.complete(state, history, pending).await
    }

    pub async fn reset_to_defaults(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        defaults: &[Column],
    ) -> GridResult<()> {
        let pending = self.begin_reset(state, history, defaults)?;
        self.complete(state, history, pending).await
    }

    /// Local width change, clamped to the allowed range; returns the applied width
    pub fn resize_column(&self, state: &mut GridState, id: &str, width: u16) -> GridResult<u16> {
        self.ensure_idle(state)?;
        let width = width.clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH);
        let mut layout = state.columns().clone();
        let column = layout
            .find_mut(id)
            .ok_or_else(|| GridError::validation(format!("Unknown column '{}'", id)))?;
        column.width = width;
        state.replace_columns(layout);
        self.save_preferences(state.columns());
        debug!(target: "column_manager", "Resized {} to {}px", id, width);
        Ok(width)
    }

    /// Persist a layout that undo/redo put back, including its deleted set.
    /// The caller reverts the history step on error.
    pub async fn persist_restored(&self, state: &mut GridState) -> GridResult<()> {
        self.ensure_idle(state)?;
        state.set_column_loading(Some(ColumnOperationLoading {
            kind: ColumnOperationKind::Restore,
            column_id: None,
        }));
        let layout = state.columns().clone();
        let result = self
            .retry
            .execute("restore column layout", || self.backend.save_column_layout(&layout))
            .await;
        state.set_column_loading(None);
        if result.is_ok() {
            info!(target: "column_manager", "Restored column layout saved");
            self.save_preferences(&layout);
        }
        result
    }

    pub fn begin_load(&self, state: &mut GridState) -> GridResult<()> {
        self.ensure_idle(state)?;
        state.set_column_loading(Some(ColumnOperationLoading {
            kind: ColumnOperationKind::Load,
            column_id: None,
        }));
        Ok(())
    }

    pub async fn fetch_layout(&self) -> DataResult<ColumnLayout> {
        self.retry
            .execute_data_result("load column layout", || self.backend.load_column_layout())
            .await
    }

    /// Apply a fetched layout. Returns `false` when nothing was stored remotely.
    pub fn finish_load(
        &self,
        state: &mut GridState,
        result: DataResult<ColumnLayout>,
    ) -> GridResult<bool> {
        state.set_column_loading(None);
        let Some(mut layout) = result.into_result()? else {
            debug!(target: "column_manager", "No stored column layout, keeping current one");
            return Ok(false);
        };

        layout.deleted.extend(state.columns().deleted.iter().cloned());
        match GridPreferences::load(&*self.preferences) {
            Ok(prefs) => layout.deleted.extend(prefs.deleted_column_ids),
            Err(e) => warn!(target: "column_manager", "Could not read deleted columns: {}", e),
        }
        layout.purge_deleted();
        if !layout.ids_are_unique() {
            return Err(GridError::terminal("Stored column layout has duplicate column ids"));
        }

        info!(target: "column_manager", "Loaded column layout ({} visible, {} hidden)",
            layout.visible.len(), layout.hidden.len());
        state.replace_columns(layout);
        self.save_preferences(state.columns());
        Ok(true)
    }

    pub async fn load_layout(&self, state: &mut GridState) -> GridResult<bool> {
        self.begin_load(state)?;
        let result = self.fetch_layout().await;
        self.finish_load(state, result)
    }

    fn save_preferences(&self, layout: &ColumnLayout) {
        if let Err(e) = GridPreferences::save_layout(&*self.preferences, layout) {
            warn!(target: "column_manager", "Could not save column preferences: {}", e);
        }
    }
}
