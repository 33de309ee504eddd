//! In-memory tabular data model shared by every pipeline stage.
//!
//! A [`Dataset`] is produced once by [`crate::pipeline::decode`] and is
//! read-only afterwards; the grouping stage clones the records it keeps
//! into [`crate::pipeline::group::Group`]s.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single scalar spreadsheet value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Empty cell.
    Null,
    /// Any numeric cell (integers, floats, date serials).
    Number(f64),
    /// Text cell, kept verbatim (no trimming).
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Render the value the way it appears in a table cell.
    ///
    /// `Null` becomes the empty string; never the text "undefined".
    pub fn to_display(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

/// Format a number like a spreadsheet's general format: integral values
/// print without a fraction, everything else uses the shortest round-trip form.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// One spreadsheet row: column name → value, in header order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowRecord {
    cells: IndexMap<String, CellValue>,
}

impl RowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(column, value)` pairs, keeping their order.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, CellValue)>,
        K: Into<String>,
    {
        Self {
            cells: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    /// Display string for `column`; missing columns render as empty.
    pub fn display(&self, column: &str) -> String {
        self.get(column).map(CellValue::to_display).unwrap_or_default()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &CellValue> {
        self.cells.values()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Decoded spreadsheet: ordered header list plus ordered records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<RowRecord>,
}

impl Dataset {
    pub fn new(headers: Vec<String>, rows: Vec<RowRecord>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[RowRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
