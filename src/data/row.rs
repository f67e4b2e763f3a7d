use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::cell_value::CellValue;
use crate::data::column::FieldPath;

pub type RowId = String;

static EMPTY: CellValue = CellValue::Empty;

/// A record in the grid. Standard fields and schemaless extension values are
/// kept in separate maps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    #[serde(default)]
    pub fields: BTreeMap<String, CellValue>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
            custom_fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: CellValue) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn with_custom(mut self, key: &str, value: CellValue) -> Self {
        self.custom_fields.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, path: &FieldPath) -> &CellValue {
        let map = match path {
            FieldPath::Standard(_) => &self.fields,
            FieldPath::Custom(_) => &self.custom_fields,
        };
        map.get(path.key()).unwrap_or(&EMPTY)
    }

    /// Store a value, returning whatever was there before
    pub fn set(&mut self, path: &FieldPath, value: CellValue) -> CellValue {
        let map = match path {
            FieldPath::Standard(_) => &mut self.fields,
            FieldPath::Custom(_) => &mut self.custom_fields,
        };
        let previous = if value == CellValue::Empty {
            map.remove(path.key())
        } else {
            map.insert(path.key().to_string(), value)
        };
        previous.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_and_custom_are_separate() {
        let mut row = Row::new("r1").with_field("owner", CellValue::Text("ann".into()));
        let custom = FieldPath::Custom("owner".into());
        assert_eq!(row.get(&custom), &CellValue::Empty);

        let prev = row.set(&custom, CellValue::Text("bob".into()));
        assert_eq!(prev, CellValue::Empty);
        assert_eq!(
            row.get(&FieldPath::Standard("owner".into())),
            &CellValue::Text("ann".into())
        );
        assert_eq!(row.get(&custom), &CellValue::Text("bob".into()));
    }

    #[test]
    fn test_setting_empty_removes_key() {
        let path = FieldPath::Standard("company".into());
        let mut row = Row::new("r1").with_field("company", CellValue::Text("Acme".into()));
        let prev = row.set(&path, CellValue::Empty);
        assert_eq!(prev, CellValue::Text("Acme".into()));
        assert!(!row.fields.contains_key("company"));
    }
}
