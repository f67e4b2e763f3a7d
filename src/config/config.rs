use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::app_paths::AppPaths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub retry: RetrySettings,
    pub filter: FilterSettings,
    pub editing: EditingConfig,
    pub history: HistorySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Row height in pixels
    pub row_height: u32,

    /// Header row height in pixels
    pub header_height: u32,

    /// Extra rows rendered above/below the viewport
    pub overscan_rows: usize,

    /// Extra columns rendered left/right of the viewport
    pub overscan_columns: usize,

    /// Rows per page
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Rows fetched per request while scanning for filter values
    pub chunk_size: usize,

    /// Stop scanning once this many distinct values were found
    pub max_distinct_values: usize,

    /// Values returned to the filter menu
    pub max_values: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditingConfig {
    /// How long the "saved" indicator stays up
    pub saved_indicator_ms: u64,

    /// Minimum gap between a popover and the viewport edges
    pub popover_margin: u16,

    pub date_popover: PopoverSize,
    pub select_popover: PopoverSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopoverSize {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Undo entries kept; the oldest are dropped first
    pub max_entries: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            row_height: 36,
            header_height: 40,
            overscan_rows: 5,
            overscan_columns: 2,
            page_size: 100,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            max_distinct_values: 10_000,
            max_values: 100,
        }
    }
}

impl Default for EditingConfig {
    fn default() -> Self {
        Self {
            saved_indicator_ms: 1000,
            popover_margin: 5,
            date_popover: PopoverSize {
                width: 280,
                height: 300,
            },
            select_popover: PopoverSize {
                width: 220,
                height: 240,
            },
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self { max_entries: 100 }
    }
}

impl Config {
    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            // Create default config if it doesn't exist
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        Ok(())
    }

    /// Get the default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        Ok(AppPaths::config_dir()?.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.filter.chunk_size, 1000);
        assert_eq!(config.editing.saved_indicator_ms, 1000);
        assert_eq!(config.editing.date_popover.height + config.editing.popover_margin, 305);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str("[retry]\nmax_attempts = 5\n").unwrap();
        assert_eq!(parsed.retry.max_attempts, 5);
        assert_eq!(parsed.retry.initial_delay_ms, 1000);
        assert_eq!(parsed.display.overscan_rows, 5);
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.display.page_size = 250;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.display.page_size, 250);
    }
}
