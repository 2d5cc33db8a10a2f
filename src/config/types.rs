//! Configuration types.
//!
//! This module defines the engine configuration and the logging enums shared
//! with the command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::config::constants::{
    DEFAULT_BACKUP_ROOT, DEFAULT_EXPORT_WORKERS, DEFAULT_MAX_ROWS_PER_TABLE,
    DEFAULT_PG_DUMP_PROGRAM, DEFAULT_PSQL_PROGRAM, DEFAULT_RETENTION_DAYS,
    DEFAULT_SWEEP_INTERVAL, DEFAULT_TOOL_TIMEOUT,
};
use crate::error_handling::SnapshotError;
use crate::models::RetentionPolicy;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: One JSON object per line for log shippers
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Engine configuration (no CLI dependencies).
///
/// Everything the engine needs is supplied here by the host process when the
/// coordinator is built; nothing is read from the environment afterwards.
///
/// # Examples
///
/// ```no_run
/// use db_snapshot::EngineConfig;
/// use std::path::PathBuf;
///
/// let config = EngineConfig {
///     database_url: "postgres://clinic@localhost/clinic".to_string(),
///     backup_root: PathBuf::from("/var/backups/clinic"),
///     retention_days: 14,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Connection string of the target database
    pub database_url: String,

    /// Directory holding every snapshot file
    pub backup_root: PathBuf,

    /// Maximum snapshot age kept by retention sweeps
    pub retention_days: u32,

    /// Parallel table reads during spreadsheet export (at least 1)
    pub export_workers: usize,

    /// Row cap per worksheet
    pub max_rows_per_table: usize,

    /// Kill external tools after this long (`None` = no limit)
    pub tool_timeout: Option<Duration>,

    /// Dump program name or path
    pub pg_dump_program: String,

    /// Restore program name or path
    pub psql_program: String,

    /// Period of the background retention task
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            backup_root: PathBuf::from(DEFAULT_BACKUP_ROOT),
            retention_days: DEFAULT_RETENTION_DAYS,
            export_workers: DEFAULT_EXPORT_WORKERS,
            max_rows_per_table: DEFAULT_MAX_ROWS_PER_TABLE,
            tool_timeout: Some(DEFAULT_TOOL_TIMEOUT),
            pg_dump_program: DEFAULT_PG_DUMP_PROGRAM.to_string(),
            psql_program: DEFAULT_PSQL_PROGRAM.to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl EngineConfig {
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age_days: self.retention_days,
        }
    }

    /// Rejects values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Configuration` describing the first bad field.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.database_url.trim().is_empty() {
            return Err(SnapshotError::Configuration(
                "database url is required".to_string(),
            ));
        }
        self.validate_retention()?;
        if self.export_workers == 0 {
            return Err(SnapshotError::Configuration(
                "export workers must be at least 1".to_string(),
            ));
        }
        if self.max_rows_per_table == 0 {
            return Err(SnapshotError::Configuration(
                "max rows per table must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks only what retention needs, so sweeps run without a database url.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Configuration` for an empty backup root or a
    /// zero sweep interval.
    pub fn validate_retention(&self) -> Result<(), SnapshotError> {
        if self.backup_root.as_os_str().is_empty() {
            return Err(SnapshotError::Configuration(
                "backup root must not be empty".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(SnapshotError::Configuration(
                "sweep interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
