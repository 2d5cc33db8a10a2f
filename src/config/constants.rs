//! Configuration constants.
//!
//! Defaults for every tunable of the snapshot engine. The CLI uses the same
//! values so library and binary behave identically out of the box.

use std::time::Duration;

/// Directory snapshots are written to when nothing else is configured
pub const DEFAULT_BACKUP_ROOT: &str = "./backups";

/// Snapshots older than this many days are removed by retention sweeps
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Concurrent table reads during spreadsheet export
pub const DEFAULT_EXPORT_WORKERS: usize = 4;

/// Rows written per worksheet; larger tables are truncated and flagged
pub const DEFAULT_MAX_ROWS_PER_TABLE: usize = 10_000;

/// External dump/restore processes are killed after this long.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_PG_DUMP_PROGRAM: &str = "pg_dump";
pub const DEFAULT_PSQL_PROGRAM: &str = "psql";
