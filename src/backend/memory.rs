//! In-process backend with scripted failures, used by tests and the demo binary.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{BulkOperationResult, GridBackend, RowSource};
use crate::data::cell_value::CellValue;
use crate::data::column::{ColumnLayout, FieldPath};
use crate::data::row::{Row, RowId};
use crate::error::{GridError, GridResult};
use crate::services::retry::DataResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendCall {
    SaveCell,
    LoadLayout,
    SaveLayout,
    BulkUpdate,
    FetchRange,
}

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<Row>,
    layout: Option<ColumnLayout>,
    failures: HashMap<BackendCall, VecDeque<GridError>>,
    bulk_results: VecDeque<BulkOperationResult>,
    calls: HashMap<BackendCall, usize>,
    fetched_ranges: Vec<(usize, usize)>,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
    latency: Duration,
}

impl InMemoryBackend {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rows,
                ..Default::default()
            }),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call, to exercise overlapping requests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_layout(self, layout: ColumnLayout) -> Self {
        self.lock().layout = Some(layout);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an error for the next call of `call`
    pub fn fail_next(&self, call: BackendCall, error: GridError) {
        self.lock().failures.entry(call).or_default().push_back(error);
    }

    /// Queue the same error `times` times
    pub fn fail_times(&self, call: BackendCall, error: GridError, times: usize) {
        let mut inner = self.lock();
        let queue = inner.failures.entry(call).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Return this result (instead of applying) on the next bulk update
    pub fn queue_bulk_result(&self, result: BulkOperationResult) {
        self.lock().bulk_results.push_back(result);
    }

    pub fn call_count(&self, call: BackendCall) -> usize {
        self.lock().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn rows(&self) -> Vec<Row> {
        self.lock().rows.clone()
    }

    pub fn stored_layout(&self) -> Option<ColumnLayout> {
        self.lock().layout.clone()
    }

    /// `(offset, limit)` of every range fetch, in order
    pub fn fetched_ranges(&self) -> Vec<(usize, usize)> {
        self.lock().fetched_ranges.clone()
    }

    async fn begin_call(&self, call: BackendCall) -> Option<GridError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut inner = self.lock();
        *inner.calls.entry(call).or_default() += 1;
        let failure = inner.failures.get_mut(&call).and_then(|q| q.pop_front());
        if let Some(err) = &failure {
            debug!(target: "memory_backend", "{:?} scripted failure: {}", call, err);
        }
        failure
    }
}

#[async_trait]
impl GridBackend for InMemoryBackend {
    async fn save_cell(&self, row_id: &str, field: &FieldPath, value: &CellValue) -> GridResult<()> {
        if let Some(err) = self.begin_call(BackendCall::SaveCell).await {
            return Err(err);
        }
        let mut inner = self.lock();
        let row = inner
            .rows
            .iter_mut()
            .find(|r| r.id == row_id)
            .ok_or_else(|| GridError::terminal(format!("row {} not found", row_id)))?;
        row.set(field, value.clone());
        Ok(())
    }

    async fn load_column_layout(&self) -> DataResult<ColumnLayout> {
        if let Some(err) = self.begin_call(BackendCall::LoadLayout).await {
            return DataResult::err(err);
        }
        match self.lock().layout.clone() {
            Some(layout) => DataResult::ok(layout),
            None => DataResult::empty(),
        }
    }

    async fn save_column_layout(&self, layout: &ColumnLayout) -> GridResult<()> {
        if let Some(err) = self.begin_call(BackendCall::SaveLayout).await {
            return Err(err);
        }
        self.lock().layout = Some(layout.clone());
        Ok(())
    }

    async fn bulk_update(
        &self,
        row_ids: &[RowId],
        field: &FieldPath,
        value: &CellValue,
    ) -> GridResult<BulkOperationResult> {
        if let Some(err) = self.begin_call(BackendCall::BulkUpdate).await {
            return Err(err);
        }
        let mut inner = self.lock();
        if let Some(result) = inner.bulk_results.pop_front() {
            return Ok(result);
        }
        let ids: BTreeSet<&str> = row_ids.iter().map(String::as_str).collect();
        let mut affected = 0;
        for row in inner.rows.iter_mut().filter(|r| ids.contains(r.id.as_str())) {
            row.set(field, value.clone());
            affected += 1;
        }
        Ok(BulkOperationResult::succeeded(affected))
    }
}

#[async_trait]
impl RowSource for InMemoryBackend {
    async fn fetch_field_range(
        &self,
        field: &FieldPath,
        offset: usize,
        limit: usize,
    ) -> DataResult<Vec<Option<String>>> {
        if let Some(err) = self.begin_call(BackendCall::FetchRange).await {
            return DataResult::err(err);
        }
        let mut inner = self.lock();
        inner.fetched_ranges.push((offset, limit));
        let values = inner
            .rows
            .iter()
            .skip(offset)
            .take(limit)
            .map(|row| match row.get(field) {
                CellValue::Empty => None,
                value => Some(value.to_string()),
            })
            .collect();
        DataResult::ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failure_then_success() {
        let backend = InMemoryBackend::new(vec![Row::new("r1")]);
        backend.fail_next(BackendCall::SaveCell, GridError::transient("flaky"));
        let path = FieldPath::Standard("company".into());
        let value = CellValue::Text("Acme".into());

        assert!(backend.save_cell("r1", &path, &value).await.is_err());
        assert!(backend.save_cell("r1", &path, &value).await.is_ok());
        assert_eq!(backend.call_count(BackendCall::SaveCell), 2);
        assert_eq!(backend.rows()[0].get(&path), &value);
    }

    #[tokio::test]
    async fn test_fetch_range_pages() {
        let rows = (0..5)
            .map(|i| Row::new(format!("r{}", i)).with_field("owner", CellValue::Text(format!("o{}", i))))
            .collect();
        let backend = InMemoryBackend::new(rows);
        let path = FieldPath::Standard("owner".into());

        let page = backend.fetch_field_range(&path, 3, 10).await;
        assert_eq!(page.data, Some(vec![Some("o3".into()), Some("o4".into())]));
        assert_eq!(backend.fetched_ranges(), vec![(3, 10)]);
    }
}
