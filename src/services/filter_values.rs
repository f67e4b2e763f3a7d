//! Distinct values of a column for the filter menu, gathered by a chunked scan.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::RowSource;
use crate::config::config::FilterSettings;
use crate::data::column::{ColumnId, ColumnLayout, FieldPath};
use crate::error::{GridError, GridResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterValueEntry {
    pub value: String,
    /// Always 1; occurrences are not counted
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterValueSet {
    pub column_id: ColumnId,
    /// Sorted ascending, at most `max_values` entries
    pub values: Vec<FilterValueEntry>,
    pub rows_scanned: usize,
    /// The scan stopped at the distinct-value cap instead of the end of the table
    pub capped: bool,
}

impl FilterValueSet {
    pub fn empty(column_id: &str) -> Self {
        Self {
            column_id: column_id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub struct FilterValueAggregator {
    source: Arc<dyn RowSource>,
    settings: FilterSettings,
}

impl FilterValueAggregator {
    pub fn new(source: Arc<dyn RowSource>, settings: FilterSettings) -> Self {
        Self { source, settings }
    }

    /// Scan `column_id` chunk by chunk.
    ///
    /// A failed chunk aborts the scan and returns its error without retrying.
    pub async fn collect(&self, layout: &ColumnLayout, column_id: &str) -> GridResult<FilterValueSet> {
        let column = layout
            .find(column_id)
            .ok_or_else(|| GridError::validation(format!("Unknown column '{}'", column_id)))?;
        let field = column.field_path();
        let chunk_size = self.settings.chunk_size.max(1);
        let cap = self.settings.max_distinct_values.max(1);
        debug!(target: "filter_values", "Scanning {} in chunks of {}", field.remote_expr(), chunk_size);

        let mut distinct = BTreeSet::new();
        let mut offset = 0;
        let mut capped = false;
        loop {
            let page = self.fetch(&field, offset, chunk_size).await?;
            let fetched = page.len();
            for value in page.into_iter().flatten() {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    distinct.insert(trimmed.to_string());
                }
            }
            offset += fetched;

            if distinct.len() >= cap {
                capped = true;
                break;
            }
            if fetched < chunk_size {
                break;
            }
        }

        info!(target: "filter_values", "{}: {} distinct value(s) from {} row(s){}",
            column_id, distinct.len(), offset, if capped { " (capped)" } else { "" });
        Ok(FilterValueSet {
            column_id: column_id.to_string(),
            values: distinct
                .into_iter()
                .take(self.settings.max_values)
                .map(|value| FilterValueEntry { value, count: 1 })
                .collect(),
            rows_scanned: offset,
            capped,
        })
    }

    async fn fetch(
        &self,
        field: &FieldPath,
        offset: usize,
        limit: usize,
    ) -> GridResult<Vec<Option<String>>> {
        let page = self.source.fetch_field_range(field, offset, limit).await;
        match page.into_result() {
            Ok(values) => Ok(values.unwrap_or_default()),
            Err(err) => {
                warn!(target: "filter_values", "Chunk at offset {} failed: {}", offset, err);
                Err(err)
            }
        }
    }
}

/// Identity of an issued filter query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FilterTicket(u64);

/// Tracks the most recent filter query so late responses can be dropped
#[derive(Debug, Clone, Default)]
pub struct FilterQueryTracker {
    latest: Arc<AtomicU64>,
}

impl FilterQueryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> FilterTicket {
        FilterTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: FilterTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Keep `response` only if it answers the latest query
    pub fn accept<T>(&self, ticket: FilterTicket, response: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(response)
        } else {
            debug!(target: "filter_values", "Discarding response for stale query #{}", ticket.0);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{BackendCall, InMemoryBackend};
    use crate::data::cell_value::CellValue;
    use crate::data::column::{default_columns, Column, ColumnType};
    use crate::data::row::Row;

    fn owners(n: usize, distinct: usize) -> Vec<Row> {
        (0..n)
            .map(|i| {
                Row::new(format!("r{}", i))
                    .with_field("owner", CellValue::Text(format!(" owner{} ", i % distinct)))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_max_values_and_placeholder_count() {
        let backend = Arc::new(InMemoryBackend::new(owners(500, 250)));
        let aggregator = FilterValueAggregator::new(backend, FilterSettings::default());
        let set = aggregator
            .collect(&ColumnLayout::new(default_columns()), "owner")
            .await
            .unwrap();
        assert_eq!(set.values.len(), 100);
        assert!(set.values.iter().all(|e| e.count == 1));
        assert_eq!(set.values[0].value, "owner0");
        assert!(!set.capped);
    }

    #[tokio::test]
    async fn test_cap_stops_scan() {
        let backend = Arc::new(InMemoryBackend::new(owners(50, 50)));
        let settings = FilterSettings {
            chunk_size: 10,
            max_distinct_values: 25,
            max_values: 100,
        };
        let aggregator = FilterValueAggregator::new(backend.clone(), settings);
        let set = aggregator
            .collect(&ColumnLayout::new(default_columns()), "owner")
            .await
            .unwrap();
        assert!(set.capped);
        assert_eq!(set.values.len(), 30);
        assert_eq!(backend.fetched_ranges().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_chunk_aborts_without_retry() {
        let backend = Arc::new(InMemoryBackend::new(owners(10, 3)));
        backend.fail_next(BackendCall::FetchRange, GridError::transient("503"));
        let aggregator = FilterValueAggregator::new(backend.clone(), FilterSettings::default());
        let err = aggregator
            .collect(&ColumnLayout::new(default_columns()), "owner")
            .await
            .unwrap_err();
        assert_eq!(err, GridError::transient("503"));
        assert_eq!(backend.call_count(BackendCall::FetchRange), 1);
    }

    #[tokio::test]
    async fn test_custom_column_reads_nested_field() {
        let rows = vec![
            Row::new("a").with_custom("region", CellValue::Text("EMEA".into())),
            Row::new("b").with_field("region", CellValue::Text("ignored".into())),
        ];
        let mut layout = ColumnLayout::new(default_columns());
        layout
            .visible
            .push(Column::new("region", "Region", ColumnType::Text).custom());
        let aggregator =
            FilterValueAggregator::new(Arc::new(InMemoryBackend::new(rows)), FilterSettings::default());
        let set = aggregator.collect(&layout, "region").await.unwrap();
        assert_eq!(
            set.values,
            vec![FilterValueEntry {
                value: "EMEA".into(),
                count: 1
            }]
        );
    }

    #[test]
    fn test_tracker_discards_stale_responses() {
        let tracker = FilterQueryTracker::new();
        let first = tracker.issue();
        let second = tracker.issue();
        assert_eq!(tracker.accept(first, "old"), None);
        assert_eq!(tracker.accept(second, "new"), Some("new"));
    }
}
