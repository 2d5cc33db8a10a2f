//! SQLite table source.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool, TypeInfo, ValueRef};

use super::source::{quote_ident, CellValue, TableRows, TableSource};
use crate::error_handling::SnapshotError;

/// Reads tables from a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteTableSource {
    pool: SqlitePool,
}

impl SqliteTableSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TableSource for SqliteTableSource {
    async fn list_tables(&self) -> Result<Vec<String>, SnapshotError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn read_table(&self, table: &str, limit: usize) -> Result<TableRows, SnapshotError> {
        let quoted = quote_ident(table);

        let columns: Vec<String> = sqlx::query(&format!("PRAGMA table_info({quoted})"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|r| r.try_get::<String, _>("name"))
            .collect::<Result<_, _>>()?;
        // SQLite has no zero-column tables, so no columns means no table.
        if columns.is_empty() {
            return Err(SnapshotError::TableNotFound(table.to_string()));
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!("SELECT * FROM {quoted} LIMIT ?"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let rows = rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| decode_cell(row, i))
                    .collect::<Result<Vec<CellValue>, SnapshotError>>()
            })
            .collect::<Result<Vec<Vec<CellValue>>, SnapshotError>>()?;

        Ok(TableRows { columns, rows })
    }
}

/// Decodes one cell by its storage class, falling back to text.
fn decode_cell(row: &SqliteRow, index: usize) -> Result<CellValue, SnapshotError> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    let decoded = match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
            row.try_get::<i64, _>(index).ok().map(CellValue::Integer)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            row.try_get::<f64, _>(index).ok().map(CellValue::Float)
        }
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .ok()
            .map(|bytes| CellValue::Text(format!("<{} bytes>", bytes.len()))),
        _ => None,
    };

    match decoded {
        Some(cell) => Ok(cell),
        None => Ok(CellValue::Text(row.try_get::<String, _>(index)?)),
    }
}
