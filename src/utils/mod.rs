//! Utility helpers: application paths and log capture.

pub mod app_paths;
pub mod logging;
