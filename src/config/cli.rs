//! Command-line interface definition.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use super::constants::{
    DEFAULT_BACKUP_ROOT, DEFAULT_EXPORT_WORKERS, DEFAULT_MAX_ROWS_PER_TABLE,
    DEFAULT_PG_DUMP_PROGRAM, DEFAULT_PSQL_PROGRAM, DEFAULT_RETENTION_DAYS,
    DEFAULT_SWEEP_INTERVAL, DEFAULT_TOOL_TIMEOUT,
};
use super::types::{EngineConfig, LogFormat, LogLevel};
use crate::models::{BackupOptions, SnapshotFormat};

/// Database snapshot tool: dumps, spreadsheet exports, restores and retention.
#[derive(Debug, Parser)]
#[command(name = "db_snapshot", version, about)]
pub struct Cli {
    /// Connection string of the target database
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Directory holding snapshot files
    #[arg(long, env = "BACKUP_ROOT", default_value = DEFAULT_BACKUP_ROOT, global = true)]
    pub backup_root: PathBuf,

    /// Delete snapshots older than this many days
    #[arg(long, env = "BACKUP_RETENTION_DAYS", default_value_t = DEFAULT_RETENTION_DAYS, global = true)]
    pub retention_days: u32,

    /// Parallel table reads for spreadsheet exports
    #[arg(long, default_value_t = DEFAULT_EXPORT_WORKERS, global = true)]
    pub export_workers: usize,

    /// Row cap per worksheet
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS_PER_TABLE, global = true)]
    pub max_rows_per_table: usize,

    /// Kill pg_dump/psql after this many seconds (0 disables the limit)
    #[arg(long, default_value_t = DEFAULT_TOOL_TIMEOUT.as_secs(), global = true)]
    pub tool_timeout_secs: u64,

    #[arg(long, env = "PG_DUMP", default_value = DEFAULT_PG_DUMP_PROGRAM, global = true)]
    pub pg_dump: String,

    #[arg(long, env = "PSQL", default_value = DEFAULT_PSQL_PROGRAM, global = true)]
    pub psql: String,

    /// Log level
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a snapshot of the target database
    Create(CreateArgs),
    /// List snapshots, newest first
    List {
        /// Print one JSON object per snapshot
        #[arg(long)]
        json: bool,
    },
    /// Delete one snapshot file
    Delete {
        /// File name inside the backup root
        file: String,
    },
    /// Replay a SQL snapshot onto the target database (destructive)
    Restore {
        /// File name inside the backup root
        file: String,
        /// Confirm that the target database may be overwritten
        #[arg(long)]
        yes: bool,
    },
    /// Delete expired snapshots once
    Sweep {
        /// Override the configured retention age
        #[arg(long)]
        max_age_days: Option<u32>,
    },
    /// Run retention sweeps periodically until interrupted
    Watch {
        #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL.as_secs())]
        interval_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Compressed SQL dump (.sql.gz)
    Sql,
    /// Spreadsheet with one sheet per table (.xlsx)
    Xlsx,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long, value_enum, default_value = "sql")]
    pub format: OutputFormat,

    /// Dump table definitions only
    #[arg(long, conflicts_with = "data_only")]
    pub schema_only: bool,

    /// Dump table contents only
    #[arg(long)]
    pub data_only: bool,

    /// Restrict the snapshot to these tables (repeatable)
    #[arg(long = "table", value_name = "NAME")]
    pub tables: Vec<String>,
}

impl CreateArgs {
    pub fn backup_options(&self) -> BackupOptions {
        BackupOptions {
            include_schema: !self.data_only,
            include_data: !self.schema_only,
            format: match self.format {
                OutputFormat::Sql => SnapshotFormat::Sql,
                OutputFormat::Xlsx => SnapshotFormat::Spreadsheet,
            },
            table_filter: self.tables.iter().cloned().collect(),
        }
    }
}

impl Cli {
    /// Builds the engine configuration from the global options.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            database_url: self.database_url.clone().unwrap_or_default(),
            backup_root: self.backup_root.clone(),
            retention_days: self.retention_days,
            export_workers: self.export_workers,
            max_rows_per_table: self.max_rows_per_table,
            tool_timeout: (self.tool_timeout_secs > 0)
                .then(|| Duration::from_secs(self.tool_timeout_secs)),
            pg_dump_program: self.pg_dump.clone(),
            psql_program: self.psql.clone(),
            sweep_interval: match &self.command {
                Command::Watch { interval_secs } => Duration::from_secs(*interval_secs),
                _ => DEFAULT_SWEEP_INTERVAL,
            },
        }
    }
}
