//! Editable grid engine: virtualized windowing, cell editing, column
//! lifecycle, undo/redo, bulk mutations, retrying persistence and filter
//! value aggregation.

pub mod backend;
pub mod cell_renderer;
pub mod column_manager;
pub mod config;
pub mod data;
pub mod error;
pub mod grid_session;
pub mod grid_state;
pub mod history_manager;
pub mod notifications;
pub mod scheduled_task;
pub mod services;
pub mod ui;
pub mod utils;

pub use error::{GridError, GridResult};
pub use grid_session::{GridSession, SessionServices};
