//! Batched mutations over the current row selection.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::backend::GridBackend;
use crate::data::cell_value::CellValue;
use crate::data::column::FieldPath;
use crate::data::row::RowId;
use crate::error::{GridError, GridResult};
use crate::grid_state::GridState;
use crate::history_manager::{HistoryManager, SnapshotId};
use crate::services::retry::RetryExecutor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkMutation {
    Status(String),
    Priority(String),
    Owner(String),
    Delete,
}

impl BulkMutation {
    /// Column the mutation writes, `None` for deletes
    pub fn column_id(&self) -> Option<&'static str> {
        match self {
            Self::Status(_) => Some("status"),
            Self::Priority(_) => Some("priority"),
            Self::Owner(_) => Some("owner"),
            Self::Delete => None,
        }
    }

    fn input(&self) -> &str {
        match self {
            Self::Status(v) | Self::Priority(v) | Self::Owner(v) => v,
            Self::Delete => "",
        }
    }
}

/// Host-provided row deletion
#[async_trait]
pub trait RowDeleter: Send + Sync {
    async fn delete_rows(&self, ids: &[RowId]) -> anyhow::Result<()>;
}

/// A bulk update applied locally and awaiting the batched backend call
#[derive(Debug, Clone)]
pub struct PendingBulkUpdate {
    pub row_ids: Vec<RowId>,
    pub field: FieldPath,
    pub value: CellValue,
    previous: Vec<(RowId, CellValue)>,
    snapshot: SnapshotId,
}

pub struct BulkOperationCoordinator {
    backend: Arc<dyn GridBackend>,
    retry: RetryExecutor,
    deleter: Option<Arc<dyn RowDeleter>>,
}

impl BulkOperationCoordinator {
    pub fn new(backend: Arc<dyn GridBackend>, retry: RetryExecutor) -> Self {
        Self {
            backend,
            retry,
            deleter: None,
        }
    }

    pub fn with_deleter(mut self, deleter: Arc<dyn RowDeleter>) -> Self {
        self.deleter = Some(deleter);
        self
    }

    fn selected_ids(state: &GridState) -> GridResult<BTreeSet<RowId>> {
        if state.selection().is_empty() {
            return Err(GridError::validation("Select at least one row first"));
        }
        Ok(state.selection().clone())
    }

    /// Validate and apply an update mutation to the selected rows
    pub fn begin_update(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        mutation: &BulkMutation,
    ) -> GridResult<PendingBulkUpdate> {
        let ids = Self::selected_ids(state)?;
        let column_id = mutation
            .column_id()
            .ok_or_else(|| GridError::validation("Deletes are not field updates"))?;
        let column = state
            .column(column_id)
            .ok_or_else(|| GridError::validation(format!("Column '{}' is not available", column_id)))?;
        let value = column.kind.parse_input(mutation.input())?;
        let field = column.field_path();

        let snapshot = history.snapshot(state, &format!("bulk update {}", column_id));
        let previous = state.set_field_for_rows(&ids, &field, &value);
        info!(target: "bulk", "Applied {} = '{}' to {} row(s)", column_id, value, previous.len());
        Ok(PendingBulkUpdate {
            row_ids: ids.into_iter().collect(),
            field,
            value,
            previous,
            snapshot,
        })
    }

    /// One batched call; an in-band `success: false` is an error
    pub async fn persist(&self, pending: &PendingBulkUpdate) -> GridResult<usize> {
        let result = self
            .retry
            .execute("bulk update", || {
                self.backend
                    .bulk_update(&pending.row_ids, &pending.field, &pending.value)
            })
            .await?;
        if result.success {
            Ok(result.affected_rows)
        } else {
            Err(GridError::terminal(
                result
                    .error
                    .unwrap_or_else(|| "Bulk update was rejected".to_string()),
            ))
        }
    }

    /// Clear the selection on success; otherwise roll back and keep it
    pub fn finish_update(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        pending: PendingBulkUpdate,
        result: GridResult<usize>,
    ) -> GridResult<usize> {
        match result {
            Ok(affected) => {
                info!(target: "bulk", "Bulk update affected {} row(s)", affected);
                state.clear_selection();
                Ok(affected)
            }
            Err(err) => {
                warn!(target: "bulk", "Bulk update failed, restoring {} row(s): {}",
                    pending.previous.len(), err);
                for (row_id, previous) in &pending.previous {
                    history.replace_cell_after(
                        pending.snapshot,
                        row_id,
                        &pending.field,
                        &pending.value,
                        previous,
                    );
                }
                history.discard(pending.snapshot);
                state.restore_field_values(&pending.field, pending.previous);
                Err(err)
            }
        }
    }

    pub async fn update_selected(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        mutation: &BulkMutation,
    ) -> GridResult<usize> {
        let pending = self.begin_update(state, history, mutation)?;
        let result = self.persist(&pending).await;
        self.finish_update(state, history, pending, result)
    }

    /// Hand the selection to the deletion callback.
    ///
    /// Rows are not removed here; on failure the selection is kept.
    pub async fn delete_selected(&self, state: &mut GridState) -> GridResult<Vec<RowId>> {
        let ids: Vec<RowId> = Self::selected_ids(state)?.into_iter().collect();
        let deleter = self
            .deleter
            .as_ref()
            .ok_or_else(|| GridError::validation("Row deletion is not available"))?;
        match deleter.delete_rows(&ids).await {
            Ok(()) => {
                info!(target: "bulk", "Deleted {} row(s)", ids.len());
                state.clear_selection();
                Ok(ids)
            }
            Err(e) => {
                error!(target: "bulk", "Deleting {} row(s) failed: {:#}", ids.len(), e);
                Err(GridError::terminal(e.to_string()))
            }
        }
    }

    /// Run any mutation; returns the number of rows affected
    pub async fn execute(
        &self,
        state: &mut GridState,
        history: &mut HistoryManager,
        mutation: &BulkMutation,
    ) -> GridResult<usize> {
        match mutation {
            BulkMutation::Delete => self.delete_selected(state).await.map(|ids| ids.len()),
            _ => self.update_selected(state, history, mutation).await,
        }
    }
}
