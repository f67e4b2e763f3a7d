//! Configuration module
//!
//! Application settings (TOML) and the persisted grid preferences
//! (column lists, deleted columns, page size).

pub mod config;
pub mod preferences;
