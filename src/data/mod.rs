//! Grid data model: typed cell values, columns and rows.

pub mod cell_value;
pub mod column;
pub mod row;
