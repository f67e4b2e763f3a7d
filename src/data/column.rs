//! Column definitions and the visible/hidden/deleted column layout.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::cell_value::CellValue;
use crate::error::{GridError, GridResult};

pub type ColumnId = String;

/// Columns that can never be deleted (they may still be hidden).
pub const PROTECTED_COLUMN_IDS: &[&str] = &["name", "status", "owner", "created_at"];

/// Width limits applied on resize (pixels)
pub const MIN_COLUMN_WIDTH: u16 = 60;
pub const MAX_COLUMN_WIDTH: u16 = 800;
pub const DEFAULT_COLUMN_WIDTH: u16 = 150;

pub fn is_protected(id: &str) -> bool {
    PROTECTED_COLUMN_IDS.contains(&id)
}

/// Column type. Each variant constrains the [`CellValue`] its rows may hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Number,
    Date,
    Status {
        options: Vec<String>,
        #[serde(default)]
        colors: BTreeMap<String, String>,
    },
    Currency {
        code: String,
    },
    Url,
    Custom,
}

/// How a column's cells are edited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    /// Text input inside the cell; keystrokes replace the value directly
    Inline,
    /// Floating editor anchored to the cell
    Popover(PopoverKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopoverKind {
    DatePicker,
    Select,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Status { .. } => "status",
            Self::Currency { .. } => "currency",
            Self::Url => "url",
            Self::Custom => "custom",
        }
    }

    pub fn edit_mode(&self) -> EditMode {
        match self {
            Self::Date => EditMode::Popover(PopoverKind::DatePicker),
            Self::Status { .. } => EditMode::Popover(PopoverKind::Select),
            _ => EditMode::Inline,
        }
    }

    /// Whether a keystroke may start editing by replacing the value
    pub fn supports_direct_typing(&self) -> bool {
        matches!(self, Self::Text | Self::Number | Self::Currency { .. } | Self::Custom)
    }

    /// Parse raw editor input into the value type this column holds.
    pub fn parse_input(&self, input: &str) -> GridResult<CellValue> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(CellValue::Empty);
        }

        match self {
            Self::Text | Self::Custom => Ok(CellValue::Text(input.to_string())),
            Self::Number => parse_number(input)
                .map(CellValue::Number)
                .ok_or_else(|| GridError::validation(format!("'{}' is not a number", input))),
            Self::Date => parse_date(input)
                .map(CellValue::Date)
                .ok_or_else(|| GridError::validation(format!("'{}' is not a valid date", input))),
            Self::Status { options, .. } => {
                if options.is_empty() {
                    return Ok(CellValue::Status(input.to_string()));
                }
                options
                    .iter()
                    .find(|opt| opt.eq_ignore_ascii_case(input))
                    .map(|opt| CellValue::Status(opt.clone()))
                    .ok_or_else(|| {
                        GridError::validation(format!(
                            "'{}' is not one of: {}",
                            input,
                            options.join(", ")
                        ))
                    })
            }
            Self::Currency { code } => {
                let stripped: String = input
                    .chars()
                    .filter(|c| !matches!(c, '$' | '€' | '£' | '¥'))
                    .collect();
                let stripped = stripped.trim().trim_end_matches(code.as_str()).trim();
                parse_number(stripped)
                    .map(|amount| CellValue::Currency {
                        amount,
                        code: code.clone(),
                    })
                    .ok_or_else(|| {
                        GridError::validation(format!("'{}' is not an amount", input))
                    })
            }
            Self::Url => {
                if input.contains(char::is_whitespace) {
                    return Err(GridError::validation(format!(
                        "'{}' is not a valid URL",
                        input
                    )));
                }
                if input.starts_with("http://") || input.starts_with("https://") {
                    Ok(CellValue::Url(input.to_string()))
                } else {
                    Ok(CellValue::Url(format!("https://{}", input)))
                }
            }
        }
    }

    /// Whether `value` is allowed in a column of this type
    pub fn accepts(&self, value: &CellValue) -> bool {
        match (self, value) {
            (_, CellValue::Empty) => true,
            (Self::Text | Self::Custom, CellValue::Text(_)) => true,
            (Self::Number, CellValue::Number(_)) => true,
            (Self::Date, CellValue::Date(_)) => true,
            (Self::Status { options, .. }, CellValue::Status(s)) => {
                options.is_empty() || options.iter().any(|o| o == s)
            }
            (Self::Currency { code }, CellValue::Currency { code: c, .. }) => code == c,
            (Self::Url, CellValue::Url(_)) => true,
            _ => false,
        }
    }
}

fn parse_number(input: &str) -> Option<f64> {
    let cleaned: String = input.chars().filter(|c| *c != ',' && *c != '_').collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_date(input: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%m/%d/%Y", "%d %b %Y", "%b %d, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
}

/// Where a column's values live on a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Indexed field of the record
    Standard,
    /// Schemaless extension value in the row's custom field bag
    Custom,
}

/// Resolved location of a column's value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    Standard(String),
    Custom(String),
}

impl FieldPath {
    pub fn key(&self) -> &str {
        match self {
            Self::Standard(k) | Self::Custom(k) => k,
        }
    }

    /// Remote column expression (`custom_fields->>key` for nested values)
    pub fn remote_expr(&self) -> String {
        match self {
            Self::Standard(k) => k.clone(),
            Self::Custom(k) => format!("custom_fields->>{}", k),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub title: String,
    #[serde(flatten)]
    pub kind: ColumnType,
    pub width: u16,
    pub editable: bool,
    #[serde(default)]
    pub frozen: bool,
    pub source: FieldSource,
}

impl Column {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            width: DEFAULT_COLUMN_WIDTH,
            editable: true,
            frozen: false,
            source: FieldSource::Standard,
        }
    }

    pub fn with_width(mut self, width: u16) -> Self {
        self.width = width;
        self
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn custom(mut self) -> Self {
        self.source = FieldSource::Custom;
        self
    }

    pub fn field_path(&self) -> FieldPath {
        match self.source {
            FieldSource::Standard => FieldPath::Standard(self.id.clone()),
            FieldSource::Custom => FieldPath::Custom(self.id.clone()),
        }
    }
}

/// Options for a column created through the lifecycle manager
#[derive(Debug, Clone, PartialEq)]
pub struct NewColumnConfig {
    pub width: u16,
    pub editable: bool,
    pub frozen: bool,
}

impl Default for NewColumnConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_COLUMN_WIDTH,
            editable: true,
            frozen: false,
        }
    }
}

/// Visible and hidden columns plus the ids that were deleted.
///
/// The deleted set is never pruned; it is what keeps a default reload from
/// bringing a removed column back.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub visible: Vec<Column>,
    pub hidden: Vec<Column>,
    pub deleted: BTreeSet<ColumnId>,
}

impl ColumnLayout {
    pub fn new(visible: Vec<Column>) -> Self {
        Self {
            visible,
            hidden: Vec::new(),
            deleted: BTreeSet::new(),
        }
    }

    /// Build a layout from defaults, dropping anything already deleted
    pub fn from_defaults(defaults: &[Column], deleted: BTreeSet<ColumnId>) -> Self {
        let visible = defaults
            .iter()
            .filter(|c| !deleted.contains(&c.id))
            .cloned()
            .collect();
        Self {
            visible,
            hidden: Vec::new(),
            deleted,
        }
    }

    pub fn visible_ids(&self) -> Vec<ColumnId> {
        self.visible.iter().map(|c| c.id.clone()).collect()
    }

    pub fn hidden_ids(&self) -> Vec<ColumnId> {
        self.hidden.iter().map(|c| c.id.clone()).collect()
    }

    pub fn visible_position(&self, id: &str) -> Option<usize> {
        self.visible.iter().position(|c| c.id == id)
    }

    pub fn hidden_position(&self, id: &str) -> Option<usize> {
        self.hidden.iter().position(|c| c.id == id)
    }

    /// Look up a column in either the visible or hidden set
    pub fn find(&self, id: &str) -> Option<&Column> {
        self.visible
            .iter()
            .chain(self.hidden.iter())
            .find(|c| c.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Column> {
        self.visible
            .iter_mut()
            .chain(self.hidden.iter_mut())
            .find(|c| c.id == id)
    }

    /// True if the id is taken by a live column or was ever deleted
    pub fn id_in_use(&self, id: &str) -> bool {
        self.find(id).is_some() || self.deleted.contains(id)
    }

    /// Drop any visible/hidden column whose id is in the deleted set
    pub fn purge_deleted(&mut self) {
        let deleted = &self.deleted;
        self.visible.retain(|c| !deleted.contains(&c.id));
        self.hidden.retain(|c| !deleted.contains(&c.id));
    }

    pub fn visible_widths(&self) -> Vec<u16> {
        self.visible.iter().map(|c| c.width).collect()
    }

    /// Check that visible and hidden ids are unique across both sets
    pub fn ids_are_unique(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.visible
            .iter()
            .chain(self.hidden.iter())
            .all(|c| seen.insert(c.id.as_str()))
    }
}

/// The stock column set of a fresh grid
pub fn default_columns() -> Vec<Column> {
    let status_options = ["Lead", "Qualified", "Proposal", "Won", "Lost"];
    let status_colors = [
        ("Lead", "gray"),
        ("Qualified", "blue"),
        ("Proposal", "amber"),
        ("Won", "green"),
        ("Lost", "red"),
    ];
    let priority_options = ["Low", "Medium", "High", "Urgent"];

    vec![
        Column::new("name", "Name", ColumnType::Text)
            .with_width(220)
            .frozen(),
        Column::new("company", "Company", ColumnType::Text),
        Column::new(
            "status",
            "Status",
            ColumnType::Status {
                options: status_options.iter().map(|s| s.to_string()).collect(),
                colors: status_colors
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        )
        .with_width(130),
        Column::new(
            "priority",
            "Priority",
            ColumnType::Status {
                options: priority_options.iter().map(|s| s.to_string()).collect(),
                colors: BTreeMap::new(),
            },
        )
        .with_width(110),
        Column::new("owner", "Owner", ColumnType::Text),
        Column::new(
            "deal_value",
            "Deal Value",
            ColumnType::Currency {
                code: "USD".to_string(),
            },
        )
        .with_width(120),
        Column::new("close_date", "Close Date", ColumnType::Date).with_width(130),
        Column::new("website", "Website", ColumnType::Url).with_width(200),
        Column::new("created_at", "Created", ColumnType::Date)
            .with_width(130)
            .read_only(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> ColumnType {
        ColumnType::Status {
            options: vec!["Lead".into(), "Won".into()],
            colors: BTreeMap::new(),
        }
    }

    #[test]
    fn test_parse_input_per_type() {
        assert_eq!(
            ColumnType::Number.parse_input("1,250.5").unwrap(),
            CellValue::Number(1250.5)
        );
        assert!(ColumnType::Number.parse_input("abc").is_err());

        assert_eq!(
            ColumnType::Date.parse_input("2024-03-01").unwrap(),
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            ColumnType::Date.parse_input("03/01/2024").unwrap(),
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );

        assert_eq!(
            status().parse_input("won").unwrap(),
            CellValue::Status("Won".into())
        );
        assert!(status().parse_input("Maybe").is_err());

        let usd = ColumnType::Currency { code: "USD".into() };
        assert_eq!(
            usd.parse_input("$2,000").unwrap(),
            CellValue::Currency {
                amount: 2000.0,
                code: "USD".into()
            }
        );

        assert_eq!(
            ColumnType::Url.parse_input("example.com").unwrap(),
            CellValue::Url("https://example.com".into())
        );
        assert_eq!(ColumnType::Text.parse_input("   ").unwrap(), CellValue::Empty);
    }

    #[test]
    fn test_accepts_constrains_value_type() {
        assert!(ColumnType::Number.accepts(&CellValue::Number(1.0)));
        assert!(!ColumnType::Number.accepts(&CellValue::Text("1".into())));
        assert!(status().accepts(&CellValue::Status("Won".into())));
        assert!(!status().accepts(&CellValue::Status("Nope".into())));
        assert!(ColumnType::Date.accepts(&CellValue::Empty));
    }

    #[test]
    fn test_edit_modes() {
        assert_eq!(
            ColumnType::Date.edit_mode(),
            EditMode::Popover(PopoverKind::DatePicker)
        );
        assert_eq!(status().edit_mode(), EditMode::Popover(PopoverKind::Select));
        assert_eq!(ColumnType::Text.edit_mode(), EditMode::Inline);
        assert!(ColumnType::Number.supports_direct_typing());
        assert!(!ColumnType::Date.supports_direct_typing());
    }

    #[test]
    fn test_layout_from_defaults_skips_deleted() {
        let deleted: BTreeSet<ColumnId> = ["company".to_string()].into_iter().collect();
        let layout = ColumnLayout::from_defaults(&default_columns(), deleted);
        assert!(layout.find("company").is_none());
        assert!(layout.id_in_use("company"));
        assert!(layout.ids_are_unique());
    }

    #[test]
    fn test_column_serialization_keeps_type_config() {
        let col = Column::new("stage", "Stage", status()).custom();
        let json = serde_json::to_string(&col).unwrap();
        let parsed: Column = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, col);
        assert_eq!(parsed.field_path(), FieldPath::Custom("stage".into()));
    }
}
