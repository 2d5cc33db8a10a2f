//! PostgreSQL table source.
//!
//! Rows are fetched as `to_jsonb(row)`, which gives every column type
//! (timestamps, numerics, arrays, enums, ...) a canonical JSON form without a
//! per-type decoder. Column order comes from `information_schema.columns`
//! because JSONB objects do not preserve key order.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use super::source::{quote_ident, CellValue, TableRows, TableSource};
use crate::error_handling::SnapshotError;

pub const DEFAULT_SCHEMA: &str = "public";

/// Reads tables of one schema from a PostgreSQL database.
#[derive(Debug, Clone)]
pub struct PgTableSource {
    pool: PgPool,
    schema: String,
}

impl PgTableSource {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// Creates a source whose connections are opened on first use.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Configuration` if the connection string cannot be parsed.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, SnapshotError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_lazy(database_url)
            .map_err(|e| SnapshotError::Configuration(format!("invalid database url: {e}")))?;
        Ok(Self::new(pool, DEFAULT_SCHEMA))
    }
}

#[async_trait]
impl TableSource for PgTableSource {
    async fn list_tables(&self) -> Result<Vec<String>, SnapshotError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables
             WHERE table_schema = $1 AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn read_table(&self, table: &str, limit: usize) -> Result<TableRows, SnapshotError> {
        let columns = sqlx::query_scalar::<_, String>(
            "SELECT column_name::text FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        if columns.is_empty() && !self.table_exists(table).await? {
            return Err(SnapshotError::TableNotFound(table.to_string()));
        }

        let sql = format!(
            "SELECT to_jsonb(t) AS row FROM {}.{} AS t LIMIT $1",
            quote_ident(&self.schema),
            quote_ident(table)
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let fetched = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;

        let mut rows = Vec::with_capacity(fetched.len());
        for row in &fetched {
            let object: serde_json::Value = row.try_get("row")?;
            rows.push(project_row(&columns, &object));
        }

        Ok(TableRows { columns, rows })
    }
}

impl PgTableSource {
    async fn table_exists(&self, table: &str) -> Result<bool, SnapshotError> {
        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables
             WHERE table_schema = $1 AND table_name = $2)",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }
}

/// Orders a `to_jsonb` row object by `columns`; absent keys become nulls.
fn project_row(columns: &[String], object: &serde_json::Value) -> Vec<CellValue> {
    columns
        .iter()
        .map(|c| object.get(c).map(CellValue::from_json).unwrap_or(CellValue::Null))
        .collect()
}
