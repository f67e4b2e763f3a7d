//! Per-column-type cell rendering.
//!
//! Each column type has a renderer implementing [`CellRender`]; the grid asks
//! the column for its renderer and never dispatches on raw callbacks.

use crate::data::cell_value::CellValue;
use crate::data::column::{Column, ColumnType};
use crate::data::row::Row;

/// Host-agnostic description of what a cell should display
#[derive(Debug, Clone, PartialEq)]
pub enum RenderNode {
    Empty,
    Text(String),
    /// Right-aligned numeric text
    Numeric(String),
    /// Colored pill (status/select values)
    Badge { label: String, color: String },
    Link { label: String, href: String },
}

impl RenderNode {
    /// Plain text form, used by the terminal table and for copying
    pub fn plain_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) | Self::Numeric(s) => s.clone(),
            Self::Badge { label, .. } => label.clone(),
            Self::Link { label, .. } => label.clone(),
        }
    }
}

pub trait CellRender {
    fn render(&self, value: &CellValue, row: &Row) -> RenderNode;
}

struct TextRenderer;
struct NumberRenderer;
struct DateRenderer;
struct CurrencyRenderer<'a> {
    code: &'a str,
}
struct StatusRenderer<'a> {
    colors: &'a std::collections::BTreeMap<String, String>,
}
struct UrlRenderer;

const DEFAULT_BADGE_COLOR: &str = "gray";

impl CellRender for TextRenderer {
    fn render(&self, value: &CellValue, _row: &Row) -> RenderNode {
        if value.is_empty() {
            RenderNode::Empty
        } else {
            RenderNode::Text(value.to_string())
        }
    }
}

impl CellRender for NumberRenderer {
    fn render(&self, value: &CellValue, _row: &Row) -> RenderNode {
        match value {
            CellValue::Number(n) => RenderNode::Numeric(group_thousands(*n, None)),
            CellValue::Empty => RenderNode::Empty,
            other => RenderNode::Text(other.to_string()),
        }
    }
}

impl CellRender for DateRenderer {
    fn render(&self, value: &CellValue, _row: &Row) -> RenderNode {
        match value {
            CellValue::Date(d) => RenderNode::Text(d.format("%b %-d, %Y").to_string()),
            CellValue::Empty => RenderNode::Empty,
            other => RenderNode::Text(other.to_string()),
        }
    }
}

impl CellRender for CurrencyRenderer<'_> {
    fn render(&self, value: &CellValue, _row: &Row) -> RenderNode {
        match value {
            CellValue::Currency { amount, code } => {
                RenderNode::Numeric(group_thousands(*amount, Some(currency_symbol(code))))
            }
            CellValue::Number(n) => {
                RenderNode::Numeric(group_thousands(*n, Some(currency_symbol(self.code))))
            }
            CellValue::Empty => RenderNode::Empty,
            other => RenderNode::Text(other.to_string()),
        }
    }
}

impl CellRender for StatusRenderer<'_> {
    fn render(&self, value: &CellValue, _row: &Row) -> RenderNode {
        if value.is_empty() {
            return RenderNode::Empty;
        }
        let label = value.to_string();
        let color = self
            .colors
            .get(&label)
            .cloned()
            .unwrap_or_else(|| DEFAULT_BADGE_COLOR.to_string());
        RenderNode::Badge { label, color }
    }
}

impl CellRender for UrlRenderer {
    fn render(&self, value: &CellValue, _row: &Row) -> RenderNode {
        match value {
            CellValue::Url(href) => {
                let label = href
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                RenderNode::Link {
                    label,
                    href: href.clone(),
                }
            }
            CellValue::Empty => RenderNode::Empty,
            other => RenderNode::Text(other.to_string()),
        }
    }
}

impl ColumnType {
    /// Renderer for this column type
    pub fn renderer(&self) -> Box<dyn CellRender + '_> {
        match self {
            Self::Text | Self::Custom => Box::new(TextRenderer),
            Self::Number => Box::new(NumberRenderer),
            Self::Date => Box::new(DateRenderer),
            Self::Status { colors, .. } => Box::new(StatusRenderer { colors }),
            Self::Currency { code } => Box::new(CurrencyRenderer { code }),
            Self::Url => Box::new(UrlRenderer),
        }
    }
}

/// Render the value of `column` on `row`
pub fn render_cell(column: &Column, row: &Row) -> RenderNode {
    let value = row.get(&column.field_path());
    column.kind.renderer().render(value, row)
}

fn currency_symbol(code: &str) -> &str {
    match code {
        "USD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" => "¥",
        other => other,
    }
}

fn group_thousands(n: f64, symbol: Option<&str>) -> String {
    let formatted = if symbol.is_some() || n.fract() != 0.0 {
        format!("{:.2}", n.abs())
    } else {
        format!("{}", n.abs() as i64)
    };
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (formatted.clone(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut out = String::new();
    if n < 0.0 {
        out.push('-');
    }
    if let Some(sym) = symbol {
        out.push_str(sym);
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(&frac);
    }
    out
}
