//! Typed table cells and rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One typed value inside a table row.
///
/// Tables carry no schema beyond header naming, so callers interpret
/// columns positionally and pick the cell variant themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

/// Ordered tuple of cells. Identity, when present, lives in one key column.
pub type Row = Vec<Cell>;

impl Cell {
    /// Creates a text cell.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Returns the text payload, if this is a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns the numeric payload, if this is a number cell.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Renders the cell the way it would be displayed in a sheet.
    ///
    /// Integral numbers render without a fractional part so that numeric
    /// keys compare equal to their text form (`12` == `"12"`).
    pub fn display_string(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Number(value) if value.fract() == 0.0 && value.is_finite() => {
                format!("{}", *value as i64)
            }
            Self::Number(value) => value.to_string(),
            Self::Date(value) => value.format("%Y-%m-%d").to_string(),
        }
    }

    /// Whether this cell holds the given key in display form.
    pub fn matches_key(&self, key: &str) -> bool {
        self.display_string().trim() == key.trim()
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// Builds a header row from column names.
pub fn header_row(columns: &[&str]) -> Row {
    columns.iter().map(|column| Cell::text(*column)).collect()
}
