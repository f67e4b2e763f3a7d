//! Persistence collaborators.
//!
//! The grid only talks to the remote store through these traits, and only
//! through the [`RetryExecutor`](crate::services::retry::RetryExecutor).

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data::cell_value::CellValue;
use crate::data::column::{ColumnLayout, FieldPath};
use crate::data::row::RowId;
use crate::error::GridResult;
use crate::services::retry::DataResult;

/// Outcome of a batched update as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperationResult {
    pub success: bool,
    #[serde(default)]
    pub affected_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkOperationResult {
    pub fn succeeded(affected_rows: usize) -> Self {
        Self {
            success: true,
            affected_rows,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            affected_rows: 0,
            error: Some(error.into()),
        }
    }
}

/// Writes (and reads back) grid data and column configuration
#[async_trait]
pub trait GridBackend: Send + Sync {
    async fn save_cell(&self, row_id: &str, field: &FieldPath, value: &CellValue) -> GridResult<()>;

    /// Stored column configuration, `data: None` when nothing was saved yet
    async fn load_column_layout(&self) -> DataResult<ColumnLayout>;

    async fn save_column_layout(&self, layout: &ColumnLayout) -> GridResult<()>;

    async fn bulk_update(
        &self,
        row_ids: &[RowId],
        field: &FieldPath,
        value: &CellValue,
    ) -> GridResult<BulkOperationResult>;
}

/// Paginated read access to one field of the remote table
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Raw values of `field` for rows `offset..offset + limit`, in table order.
    /// Fewer than `limit` entries means the table is exhausted.
    async fn fetch_field_range(
        &self,
        field: &FieldPath,
        offset: usize,
        limit: usize,
    ) -> DataResult<Vec<Option<String>>>;
}
