//! Error type definitions.
//!
//! This module defines the error and warning types surfaced by the snapshot engine.

use std::path::Path;

use log::SetLoggerError;
use rust_xlsxwriter::XlsxError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),
}

/// Stable classification of a [`SnapshotError`].
///
/// Callers (the CRUD layer, the CLI) map these to their own status codes; the
/// string form returned by [`ErrorKind::as_str`] never changes between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorKind {
    /// Missing or invalid connection info or backup options
    Configuration,
    /// External dump/restore process missing, killed, or exited non-zero
    ToolInvocation,
    /// Disk full, permission denied, path traversal attempt
    Io,
    /// Unsupported or mismatched file type on restore
    Format,
    /// Operating on a snapshot that does not exist
    NotFound,
    /// Another backup/restore holds the lease for the same target
    OperationInProgress,
    /// Catalog or row query against the target database failed
    Database,
    /// Caller cancelled the operation or its timeout expired
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::ToolInvocation => "tool_invocation_error",
            ErrorKind::Io => "io_error",
            ErrorKind::Format => "format_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::OperationInProgress => "operation_in_progress",
            ErrorKind::Database => "database_error",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal errors raised by snapshot operations.
///
/// Every variant leaves no partial artifact behind in the backup root.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Connection string or engine configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backup options are contradictory (e.g. neither schema nor data requested).
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// External tool could not be started, was killed, or exited non-zero.
    #[error("{tool} failed: {message}")]
    ToolInvocation {
        /// Program name as configured
        tool: String,
        /// Exit status and captured stderr
        message: String,
    },

    /// Filesystem failure.
    #[error("I/O error ({context}): {source}")]
    Io {
        /// What was being attempted
        context: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A file name that would resolve outside the backup root.
    #[error("Path escapes backup root: {0}")]
    PathTraversal(String),

    /// File type cannot be used for the requested operation.
    #[error("Format error: {0}")]
    Format(String),

    /// Snapshot file does not exist.
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// Table vanished from the catalog between listing and reading.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Lease for the target is already held.
    #[error("Operation already in progress for {0}")]
    OperationInProgress(String),

    /// SQL execution error against the target database.
    #[error("SQL error: {0}")]
    Database(#[from] sqlx::Error),

    /// Workbook could not be assembled or saved.
    #[error("Workbook error: {0}")]
    Workbook(#[from] XlsxError),

    /// Caller cancelled the operation or its deadline passed.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl SnapshotError {
    /// Returns the stable kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SnapshotError::Configuration(_) | SnapshotError::InvalidOptions(_) => {
                ErrorKind::Configuration
            }
            SnapshotError::ToolInvocation { .. } => ErrorKind::ToolInvocation,
            SnapshotError::Io { .. }
            | SnapshotError::PathTraversal(_)
            | SnapshotError::Workbook(_) => ErrorKind::Io,
            SnapshotError::Format(_) => ErrorKind::Format,
            SnapshotError::NotFound(_) | SnapshotError::TableNotFound(_) => ErrorKind::NotFound,
            SnapshotError::OperationInProgress(_) => ErrorKind::OperationInProgress,
            SnapshotError::Database(_) => ErrorKind::Database,
            SnapshotError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Wraps an I/O error with the path it concerns.
    pub fn io(action: &str, path: &Path, source: std::io::Error) -> Self {
        SnapshotError::Io {
            context: format!("{action} {}", path.display()),
            source,
        }
    }
}

/// Non-fatal failure of a single table during a spreadsheet export.
///
/// The export still succeeds; the table's worksheet carries a diagnostic row
/// and the warning is returned to the caller alongside the snapshot record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PartialExportWarning {
    /// Table the failure belongs to
    pub table: String,
    /// Human-readable failure description
    pub message: String,
}

impl std::fmt::Display for PartialExportWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "table {}: {}", self.table, self.message)
    }
}
