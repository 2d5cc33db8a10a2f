//! Single entry point for snapshot operations.
//!
//! [`SnapshotCoordinator`] exposes the operations the host application calls:
//! create, list, delete, restore and sweep. Creating and restoring hold an
//! exclusive per-target lease for their whole duration; a second caller for the
//! same target fails fast with `OperationInProgress`. Coordinators only exclude
//! each other when they share a [`LeaseRegistry`] (see
//! [`SnapshotCoordinator::with_leases`]).

pub mod lease;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};
use log::{info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::catalog::{naming, CatalogReader};
use crate::config::EngineConfig;
use crate::connection::ConnectionInfo;
use crate::dump::DumpExporter;
use crate::error_handling::SnapshotError;
use crate::models::{
    BackupOptions, RetentionPolicy, SnapshotFormat, SnapshotOutcome, SnapshotRecord,
};
use crate::restore::RestoreExecutor;
use crate::retention::{RetentionManager, SweepReport};
use crate::tabular::postgres::PgTableSource;
use crate::tabular::{TableSource, TabularExporter};
use crate::tool::{ProcessRunner, ToolRunner};

pub use lease::{LeaseGuard, LeaseRegistry};

/// Orchestrates backups, restores and retention for one target database.
pub struct SnapshotCoordinator {
    connection: ConnectionInfo,
    catalog: CatalogReader,
    dump: DumpExporter,
    tabular: TabularExporter,
    restore: RestoreExecutor,
    retention: Arc<RetentionManager>,
    retention_policy: RetentionPolicy,
    leases: LeaseRegistry,
    // Last creation timestamp handed out; later ones are strictly greater.
    last_issued: Mutex<Option<DateTime<Utc>>>,
}

impl SnapshotCoordinator {
    /// Builds a coordinator from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Configuration` if the configuration is invalid
    /// or the connection string cannot be parsed.
    pub fn new(
        config: &EngineConfig,
        table_source: Arc<dyn TableSource>,
        runner: Arc<dyn ToolRunner>,
    ) -> Result<Self, SnapshotError> {
        config.validate()?;
        let connection = ConnectionInfo::parse(&config.database_url)?;
        let catalog = CatalogReader::new(config.backup_root.clone());

        Ok(Self {
            dump: DumpExporter::new(
                Arc::clone(&runner),
                config.pg_dump_program.clone(),
                config.tool_timeout,
            ),
            tabular: TabularExporter::new(
                table_source,
                config.export_workers,
                config.max_rows_per_table,
            ),
            restore: RestoreExecutor::new(runner, config.psql_program.clone(), config.tool_timeout),
            retention: Arc::new(RetentionManager::new(catalog.clone())),
            retention_policy: config.retention_policy(),
            leases: LeaseRegistry::new(),
            last_issued: Mutex::new(None),
            connection,
            catalog,
        })
    }

    /// Builds a coordinator that talks to PostgreSQL and runs the real tools.
    ///
    /// The database pool connects lazily, so this does not touch the network.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Configuration` for an unusable configuration.
    pub fn connect(config: &EngineConfig) -> Result<Self, SnapshotError> {
        config.validate()?;
        ConnectionInfo::parse(&config.database_url)?;
        let workers = u32::try_from(config.export_workers).unwrap_or(u32::MAX);
        let source = PgTableSource::connect_lazy(&config.database_url, workers)?;
        Self::new(config, Arc::new(source), Arc::new(ProcessRunner))
    }

    /// Replaces the coordinator's private lease registry with a shared one.
    ///
    /// Hosts that build more than one coordinator for the same target (for
    /// example one per request) must hand each the same registry.
    pub fn with_leases(mut self, leases: LeaseRegistry) -> Self {
        self.leases = leases;
        self
    }

    /// Handle to the registry this coordinator takes its leases from.
    pub fn leases(&self) -> LeaseRegistry {
        self.leases.clone()
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn backup_root(&self) -> &Path {
        self.catalog.root()
    }

    /// Shared handle for background retention tasks.
    pub fn retention_manager(&self) -> Arc<RetentionManager> {
        Arc::clone(&self.retention)
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        self.retention_policy
    }

    /// Creates a snapshot with no cancellation beyond the tool timeout.
    ///
    /// # Errors
    ///
    /// See [`SnapshotCoordinator::create_snapshot_with_cancel`].
    pub async fn create_snapshot(
        &self,
        options: &BackupOptions,
    ) -> Result<SnapshotOutcome, SnapshotError> {
        self.create_snapshot_with_cancel(options, &CancellationToken::new())
            .await
    }

    /// Creates a snapshot in the requested format.
    ///
    /// # Errors
    ///
    /// - `OperationInProgress` if a backup or restore of the same target is running
    /// - `Configuration` for unusable options
    /// - Any error of the selected exporter; no file is left behind in that case
    pub async fn create_snapshot_with_cancel(
        &self,
        options: &BackupOptions,
        cancel: &CancellationToken,
    ) -> Result<SnapshotOutcome, SnapshotError> {
        validate_options(options)?;
        let _lease = self.leases.try_acquire(&self.connection.target_key())?;

        self.ensure_root().await?;
        let created_at = self.issue_timestamp(options.format).await?;
        let file_name = naming::snapshot_file_name(created_at, options.format);
        let dest = self.catalog.root().join(&file_name);
        info!(
            "Creating {} snapshot {file_name} of {}",
            options.format,
            self.connection.target_key()
        );

        let outcome = match options.format {
            SnapshotFormat::Sql => {
                let record = self
                    .dump
                    .export(&self.connection, options, &dest, created_at, cancel)
                    .await?;
                SnapshotOutcome {
                    record,
                    warnings: Vec::new(),
                    tables: Vec::new(),
                }
            }
            SnapshotFormat::Spreadsheet => {
                let export = self.tabular.export(options, &dest, created_at, cancel).await?;
                for warning in &export.warnings {
                    warn!("Partial export of {file_name}: {warning}");
                }
                SnapshotOutcome {
                    record: export.record,
                    warnings: export.warnings,
                    tables: export.tables,
                }
            }
            SnapshotFormat::Unknown => {
                return Err(SnapshotError::InvalidOptions(
                    "snapshot format must be sql or spreadsheet".to_string(),
                ))
            }
        };
        Ok(outcome)
    }

    /// Lists every file in the backup root, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Io` if the backup root cannot be read.
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        self.catalog.list().await
    }

    /// Deletes one snapshot file.
    ///
    /// # Errors
    ///
    /// `Io` (path traversal) for names that would leave the backup root,
    /// `NotFound` if the file does not exist.
    pub async fn delete_snapshot(&self, file_name: &str) -> Result<(), SnapshotError> {
        let path = naming::resolve_in_root(self.catalog.root(), file_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted snapshot {file_name}");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SnapshotError::NotFound(file_name.to_string()))
            }
            Err(e) => Err(SnapshotError::io("remove", &path, e)),
        }
    }

    /// Replays a SQL snapshot onto the target database.
    ///
    /// # Errors
    ///
    /// See [`SnapshotCoordinator::restore_snapshot_with_cancel`].
    pub async fn restore_snapshot(&self, file_name: &str) -> Result<(), SnapshotError> {
        self.restore_snapshot_with_cancel(file_name, &CancellationToken::new())
            .await
    }

    /// Replays a SQL snapshot, holding the target's lease throughout.
    ///
    /// # Errors
    ///
    /// - `Io` (path traversal) for names that would leave the backup root
    /// - `Format` for spreadsheets and unknown file types, before any process runs
    /// - `NotFound` if the file does not exist
    /// - `OperationInProgress` if a backup or restore of the target is running
    /// - `ToolInvocation` if the restore tool fails
    pub async fn restore_snapshot_with_cancel(
        &self,
        file_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SnapshotError> {
        let path = naming::resolve_in_root(self.catalog.root(), file_name)?;
        if naming::classify(file_name) == SnapshotFormat::Spreadsheet {
            return Err(SnapshotError::Format(format!(
                "{file_name} is a spreadsheet export and cannot be restored"
            )));
        }
        let _lease = self.leases.try_acquire(&self.connection.target_key())?;
        self.restore.restore(&self.connection, &path, cancel).await
    }

    /// Runs one retention sweep with the configured policy.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Io` if the backup root cannot be listed.
    pub async fn sweep(&self) -> Result<SweepReport, SnapshotError> {
        self.retention.sweep(self.retention_policy).await
    }

    /// Runs one retention sweep with an explicit policy.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Io` if the backup root cannot be listed.
    pub async fn sweep_with(&self, policy: RetentionPolicy) -> Result<SweepReport, SnapshotError> {
        self.retention.sweep(policy).await
    }

    async fn ensure_root(&self) -> Result<(), SnapshotError> {
        let root = self.catalog.root();
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| SnapshotError::io("create backup root", root, e))
    }

    /// Hands out a millisecond timestamp strictly later than the previous one
    /// whose file name is not taken yet.
    async fn issue_timestamp(
        &self,
        format: SnapshotFormat,
    ) -> Result<DateTime<Utc>, SnapshotError> {
        let mut last = self.last_issued.lock().await;
        let mut candidate = Utc::now().trunc_subsecs(3);
        if let Some(previous) = *last {
            if candidate <= previous {
                candidate = previous + ChronoDuration::milliseconds(1);
            }
        }
        loop {
            let path = self
                .catalog
                .root()
                .join(naming::snapshot_file_name(candidate, format));
            if !name_taken(&path).await? {
                break;
            }
            candidate += ChronoDuration::milliseconds(1);
        }
        *last = Some(candidate);
        Ok(candidate)
    }
}

/// True if `path` or its in-progress temp file exists.
async fn name_taken(path: &Path) -> Result<bool, SnapshotError> {
    for candidate in [path.to_path_buf(), naming::temp_path(path)] {
        let exists = tokio::fs::try_exists(&candidate)
            .await
            .map_err(|e| SnapshotError::io("check snapshot name", &candidate, e))?;
        if exists {
            return Ok(true);
        }
    }
    Ok(false)
}

fn validate_options(options: &BackupOptions) -> Result<(), SnapshotError> {
    match options.format {
        SnapshotFormat::Sql if !options.include_schema && !options.include_data => {
            Err(SnapshotError::InvalidOptions(
                "at least one of schema or data must be included".to_string(),
            ))
        }
        SnapshotFormat::Unknown => Err(SnapshotError::InvalidOptions(
            "snapshot format must be sql or spreadsheet".to_string(),
        )),
        SnapshotFormat::Sql | SnapshotFormat::Spreadsheet => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::sqlite::SqliteTableSource;
    use crate::tool::{ToolInvocation, ToolOutput};
    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Writes a tiny dump to the requested file.
    #[derive(Default)]
    struct FakeDump {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolRunner for FakeDump {
        async fn run(
            &self,
            invocation: ToolInvocation,
            _cancel: &CancellationToken,
        ) -> Result<ToolOutput, SnapshotError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(file) = invocation.flag_value("--file") {
                if invocation.program == "pg_dump" {
                    std::fs::write(file, "-- dump\n").unwrap();
                }
            }
            Ok(ToolOutput {
                exit_code: Some(0),
                stderr: String::new(),
            })
        }
    }

    async fn coordinator(dir: &TempDir) -> (SnapshotCoordinator, Arc<FakeDump>) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let runner = Arc::new(FakeDump::default());
        let config = EngineConfig {
            database_url: "postgres://clinic@localhost/clinic".to_string(),
            backup_root: dir.path().join("backups"),
            ..Default::default()
        };
        let coordinator = SnapshotCoordinator::new(
            &config,
            Arc::new(SqliteTableSource::new(pool)),
            runner.clone(),
        )
        .unwrap();
        (coordinator, runner)
    }

    #[tokio::test]
    async fn test_creates_backup_root_on_first_use() {
        let dir = TempDir::new().unwrap();
        let (coordinator, _) = coordinator(&dir).await;
        assert!(coordinator.list_snapshots().await.unwrap().is_empty());

        let outcome = coordinator
            .create_snapshot(&BackupOptions::full_sql())
            .await
            .unwrap();
        assert!(coordinator.backup_root().is_dir());
        assert!(outcome.record.file_name.starts_with("backup_"));
        assert!(outcome.record.file_name.ends_with(".sql.gz"));
    }

    #[tokio::test]
    async fn test_issued_timestamps_strictly_increase() {
        let dir = TempDir::new().unwrap();
        let (coordinator, _) = coordinator(&dir).await;
        let mut previous = None;
        for _ in 0..20 {
            let ts = coordinator
                .issue_timestamp(SnapshotFormat::Sql)
                .await
                .unwrap();
            if let Some(p) = previous {
                assert!(ts > p);
            }
            previous = Some(ts);
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_sql_options_before_running_tools() {
        let dir = TempDir::new().unwrap();
        let (coordinator, runner) = coordinator(&dir).await;
        let options = BackupOptions {
            include_schema: false,
            include_data: false,
            ..BackupOptions::full_sql()
        };
        let err = coordinator.create_snapshot(&options).await.unwrap_err();
        assert_eq!(err.kind(), crate::error_handling::ErrorKind::Configuration);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_rejects_traversal_and_missing() {
        let dir = TempDir::new().unwrap();
        let (coordinator, _) = coordinator(&dir).await;
        std::fs::write(dir.path().join("outside.txt"), "keep").unwrap();

        let err = coordinator
            .delete_snapshot("../outside.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::PathTraversal(_)));
        assert!(dir.path().join("outside.txt").exists());

        let err = coordinator
            .delete_snapshot("backup_missing.sql.gz")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_listed_snapshot() {
        let dir = TempDir::new().unwrap();
        let (coordinator, _) = coordinator(&dir).await;
        let outcome = coordinator
            .create_snapshot(&BackupOptions::full_sql())
            .await
            .unwrap();
        coordinator
            .delete_snapshot(&outcome.record.file_name)
            .await
            .unwrap();
        assert!(coordinator.list_snapshots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lease_released_after_failure() {
        let dir = TempDir::new().unwrap();
        let (coordinator, _) = coordinator(&dir).await;
        let key = coordinator.connection().target_key();

        let err = coordinator
            .restore_snapshot("backup_nothing.sql.gz")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound(_)));
        assert!(!coordinator.leases.is_held(&key));
    }

    #[tokio::test]
    async fn test_name_check_propagates_io_errors() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not_a_dir");
        std::fs::write(&file, "x").unwrap();

        // A regular file used as a directory is an error, not a free name.
        let err = name_taken(&file.join("backup_x.sql.gz")).await.unwrap_err();
        assert_eq!(err.kind(), crate::error_handling::ErrorKind::Io);

        assert!(!name_taken(&dir.path().join("backup_y.sql.gz")).await.unwrap());
        std::fs::write(dir.path().join("backup_y.sql.gz.tmp"), "").unwrap();
        assert!(name_taken(&dir.path().join("backup_y.sql.gz")).await.unwrap());
    }

    #[tokio::test]
    async fn test_with_leases_shares_registry() {
        let dir = TempDir::new().unwrap();
        let shared = LeaseRegistry::new();
        let (first, _) = coordinator(&dir).await;
        let first = first.with_leases(shared.clone());
        let (second, runner) = coordinator(&dir).await;
        let second = second.with_leases(shared.clone());

        let key = first.connection().target_key();
        let _held = first.leases().try_acquire(&key).unwrap();
        let err = second
            .create_snapshot(&BackupOptions::full_sql())
            .await
            .unwrap_err();
        assert_eq!(
            err.kind(),
            crate::error_handling::ErrorKind::OperationInProgress
        );
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }
}
