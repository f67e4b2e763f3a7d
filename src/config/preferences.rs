//! Persisted grid configuration.
//!
//! Values live under logical keys. Column lists carry a version suffix so a
//! schema change simply starts from defaults again; the deleted-column set is
//! deliberately unversioned and survives every reset.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::data::column::{Column, ColumnId, ColumnLayout};
use crate::utils::app_paths::AppPaths;

pub const VISIBLE_COLUMNS_KEY: &str = "grid.columns.visible.v2";
pub const HIDDEN_COLUMNS_KEY: &str = "grid.columns.hidden.v2";
pub const DELETED_COLUMNS_KEY: &str = "grid.columns.deleted";
pub const PAGE_SIZE_KEY: &str = "grid.page_size.v1";

/// Key/value store for grid preferences
pub trait PreferencesStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryPreferencesStore {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryPreferencesStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferencesStore for MemoryPreferencesStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self.values.lock().map_err(|_| anyhow!("preferences lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| anyhow!("preferences lock poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| anyhow!("preferences lock poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

/// JSON file holding all keys in one object
#[derive(Debug)]
pub struct FilePreferencesStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePreferencesStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Store in the user's data directory
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(AppPaths::preferences_file()?))
    }

    fn read_all(&self) -> Result<BTreeMap<String, Value>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&contents) {
            Ok(values) => Ok(values),
            Err(e) => {
                warn!(target: "preferences", "Ignoring corrupt preferences file {}: {}",
                    self.path.display(), e);
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_all(&self, values: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

impl PreferencesStore for FilePreferencesStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("preferences lock poisoned"))?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("preferences lock poisoned"))?;
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value);
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| anyhow!("preferences lock poisoned"))?;
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

/// Typed view over the preference keys
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridPreferences {
    pub visible_columns: Option<Vec<Column>>,
    pub hidden_columns: Vec<Column>,
    pub deleted_column_ids: BTreeSet<ColumnId>,
    pub page_size: Option<usize>,
}

impl GridPreferences {
    pub fn load(store: &dyn PreferencesStore) -> Result<Self> {
        Ok(Self {
            visible_columns: read_key(store, VISIBLE_COLUMNS_KEY)?,
            hidden_columns: read_key(store, HIDDEN_COLUMNS_KEY)?.unwrap_or_default(),
            deleted_column_ids: read_key(store, DELETED_COLUMNS_KEY)?.unwrap_or_default(),
            page_size: read_key(store, PAGE_SIZE_KEY)?,
        })
    }

    /// Column layout to start from; stored lists win over defaults
    pub fn layout(&self, defaults: &[Column]) -> ColumnLayout {
        let mut layout = match &self.visible_columns {
            Some(visible) => ColumnLayout {
                visible: visible.clone(),
                hidden: self.hidden_columns.clone(),
                deleted: self.deleted_column_ids.clone(),
            },
            None => ColumnLayout::from_defaults(defaults, self.deleted_column_ids.clone()),
        };
        layout.purge_deleted();
        layout
    }

    pub fn save_layout(store: &dyn PreferencesStore, layout: &ColumnLayout) -> Result<()> {
        store.set(VISIBLE_COLUMNS_KEY, serde_json::to_value(&layout.visible)?)?;
        store.set(HIDDEN_COLUMNS_KEY, serde_json::to_value(&layout.hidden)?)?;
        Self::save_deleted(store, &layout.deleted)
    }

    pub fn save_deleted(store: &dyn PreferencesStore, deleted: &BTreeSet<ColumnId>) -> Result<()> {
        debug!(target: "preferences", "Persisting {} deleted column id(s)", deleted.len());
        store.set(DELETED_COLUMNS_KEY, serde_json::to_value(deleted)?)
    }

    pub fn save_page_size(store: &dyn PreferencesStore, page_size: usize) -> Result<()> {
        store.set(PAGE_SIZE_KEY, Value::from(page_size))
    }

    /// Forget the column lists but keep the deleted set
    pub fn reset_columns(store: &dyn PreferencesStore) -> Result<()> {
        store.remove(VISIBLE_COLUMNS_KEY)?;
        store.remove(HIDDEN_COLUMNS_KEY)
    }
}

fn read_key<T: serde::de::DeserializeOwned>(
    store: &dyn PreferencesStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key)? {
        None => Ok(None),
        Some(value) => match serde_json::from_value(value) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                warn!(target: "preferences", "Discarding unreadable value for {}: {}", key, e);
                Ok(None)
            }
        },
    }
}
