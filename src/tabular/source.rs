//! Table data sources for spreadsheet exports.

use async_trait::async_trait;

use crate::error_handling::SnapshotError;

/// One cell value read from the database.
///
/// Anything that is not a primitive (dates, JSON, arrays, UUIDs, ...) arrives
/// here already coerced to its canonical string form as `Text`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Converts a JSON value (as produced by `to_jsonb(row)`) into a cell.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => CellValue::Null,
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CellValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    CellValue::Float(f)
                } else {
                    CellValue::Text(n.to_string())
                }
            }
            Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }

    /// Canonical textual form, used for width estimation and the diagnostic sheet.
    pub fn display_len(&self) -> usize {
        match self {
            CellValue::Null => 0,
            CellValue::Bool(b) => b.to_string().len(),
            CellValue::Integer(i) => i.to_string().len(),
            CellValue::Float(f) => f.to_string().len(),
            CellValue::Text(s) => s.chars().count(),
        }
    }
}

/// Rows read from one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRows {
    /// Column names in table order
    pub columns: Vec<String>,
    /// Row values, one entry per column
    pub rows: Vec<Vec<CellValue>>,
}

/// Where spreadsheet exports read their rows from.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Lists base tables (no views) in catalog order.
    async fn list_tables(&self) -> Result<Vec<String>, SnapshotError>;

    /// Reads at most `limit` rows of `table`, plus its column names.
    async fn read_table(&self, table: &str, limit: usize) -> Result<TableRows, SnapshotError>;
}

/// Quotes an SQL identifier (`"name"`, with embedded quotes doubled).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
