//! Persistence-facing services shared by the grid components.

pub mod bulk_operations;
pub mod filter_values;
pub mod retry;

pub use bulk_operations::{BulkMutation, BulkOperationCoordinator};
pub use filter_values::{FilterQueryTracker, FilterValueAggregator, FilterValueSet};
pub use retry::{DataResult, RetryConfig, RetryExecutor};
