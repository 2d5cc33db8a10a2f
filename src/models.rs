//! Snapshot data model.
//!
//! Types shared between the coordinator, the exporters and the catalog.

use std::collections::BTreeSet;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error_handling::PartialExportWarning;

/// Requested snapshot format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    /// Compressed logical dump produced by the external dump tool (`.sql.gz`)
    Sql,
    /// Multi-sheet workbook with one worksheet per table (`.xlsx`)
    Spreadsheet,
    /// Anything else found in the backup root (orphans, in-progress files)
    Unknown,
}

impl SnapshotFormat {
    /// File extension (without the leading dot) used for this format.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            SnapshotFormat::Sql => Some("sql.gz"),
            SnapshotFormat::Spreadsheet => Some("xlsx"),
            SnapshotFormat::Unknown => None,
        }
    }
}

impl std::fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SnapshotFormat::Sql => "sql",
            SnapshotFormat::Spreadsheet => "spreadsheet",
            SnapshotFormat::Unknown => "unknown",
        })
    }
}

/// Options for creating a snapshot.
///
/// For [`SnapshotFormat::Spreadsheet`] the schema/data switches are ignored:
/// spreadsheet exports are always data-only, one worksheet per table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    /// Dump table definitions
    pub include_schema: bool,
    /// Dump table contents
    pub include_data: bool,
    /// Output format
    pub format: SnapshotFormat,
    /// Restrict to these tables (empty = all base tables)
    pub table_filter: BTreeSet<String>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            include_schema: true,
            include_data: true,
            format: SnapshotFormat::Sql,
            table_filter: BTreeSet::new(),
        }
    }
}

impl BackupOptions {
    /// Full SQL dump (schema and data) of every table.
    pub fn full_sql() -> Self {
        Self::default()
    }

    /// Spreadsheet export of every table.
    pub fn spreadsheet() -> Self {
        Self {
            format: SnapshotFormat::Spreadsheet,
            ..Self::default()
        }
    }
}

/// A snapshot file present in the backup root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRecord {
    /// File name relative to the backup root
    pub file_name: String,
    /// Size on disk in bytes
    pub size_bytes: u64,
    /// Creation time encoded in the file name (file mtime when the name carries none)
    pub created_at: DateTime<Utc>,
    /// Last modification time reported by the filesystem
    #[serde(skip)]
    pub modified_at: SystemTime,
    /// Format classified from the extension
    pub format: SnapshotFormat,
}

/// Per-table result of a spreadsheet export. Lives only for one export run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    /// Table name as reported by the database catalog
    pub table_name: String,
    /// Rows written to the worksheet
    pub row_count: usize,
    /// Column names in table order
    pub columns: Vec<String>,
    /// More rows existed than the per-table cap allowed
    pub truncated: bool,
    /// Failure reading or writing this table
    pub export_error: Option<String>,
}

/// Age-based retention policy applied to every file in the backup root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Files whose mtime is older than this many days are deleted
    pub max_age_days: u32,
}

/// Result of a successful `create_snapshot` call.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotOutcome {
    /// The newly cataloged snapshot
    pub record: SnapshotRecord,
    /// Tables that failed during a spreadsheet export (always empty for SQL)
    pub warnings: Vec<PartialExportWarning>,
    /// Per-table summary (spreadsheet exports only)
    pub tables: Vec<TableSnapshot>,
}
