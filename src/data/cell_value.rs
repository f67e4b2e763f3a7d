use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A typed cell value. Which variants a column accepts is decided by its
/// [`ColumnType`](crate::data::column::ColumnType).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Status(String),
    Currency { amount: f64, code: String },
    Url(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) | Self::Status(s) | Self::Url(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(s) | Self::Status(s) | Self::Url(s) => write!(f, "{}", s),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Currency { amount, code } => write!(f, "{:.2} {}", amount, code),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s.to_string())
        }
    }
}
