//! Compressed logical dumps via `pg_dump`.
//!
//! The dump is written to `<name>.sql.tmp`, compressed to `<name>.sql.gz.tmp`
//! and only renamed to `<name>.sql.gz` once the tool exited with status 0 and
//! compression finished. Any failure removes both temporaries, so the catalog
//! never sees a half-written dump under a final name.

pub mod compress;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::catalog::naming;
use crate::connection::ConnectionInfo;
use crate::error_handling::SnapshotError;
use crate::models::{BackupOptions, SnapshotFormat, SnapshotRecord};
use crate::tool::{ToolInvocation, ToolRunner};

/// Produces `.sql.gz` snapshots with the external dump utility.
pub struct DumpExporter {
    runner: Arc<dyn ToolRunner>,
    program: String,
    timeout: Option<Duration>,
}

impl DumpExporter {
    pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            runner,
            program: program.into(),
            timeout,
        }
    }

    /// Builds the dump invocation writing raw SQL to `raw_path`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::InvalidOptions` when neither schema nor data is
    /// requested or the format is not SQL.
    pub fn build_invocation(
        &self,
        connection: &ConnectionInfo,
        options: &BackupOptions,
        raw_path: &Path,
    ) -> Result<ToolInvocation, SnapshotError> {
        if options.format != SnapshotFormat::Sql {
            return Err(SnapshotError::InvalidOptions(format!(
                "dump exporter cannot produce {} snapshots",
                options.format
            )));
        }

        let mut args: Vec<OsString> = vec!["--no-owner".into(), "--no-privileges".into()];
        match (options.include_schema, options.include_data) {
            (true, true) => {}
            (false, true) => args.push("--data-only".into()),
            (true, false) => args.push("--schema-only".into()),
            (false, false) => {
                return Err(SnapshotError::InvalidOptions(
                    "at least one of schema or data must be included".to_string(),
                ))
            }
        }
        for table in &options.table_filter {
            args.push(format!("--table={table}").into());
        }
        let mut file_arg = OsString::from("--file=");
        file_arg.push(raw_path.as_os_str());
        args.push(file_arg);

        Ok(ToolInvocation {
            program: self.program.clone(),
            args,
            env: connection.tool_env(),
            timeout: self.timeout,
        })
    }

    /// Dumps the target database into `dest` (a `.sql.gz` path).
    ///
    /// # Errors
    ///
    /// Returns `InvalidOptions` for unusable options, `ToolInvocation` when the
    /// dump tool is missing or exits non-zero (with its stderr), `Cancelled`
    /// on timeout/cancellation and `Io` for filesystem failures. In every
    /// error case no file is left behind.
    pub async fn export(
        &self,
        connection: &ConnectionInfo,
        options: &BackupOptions,
        dest: &Path,
        created_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SnapshotRecord, SnapshotError> {
        let raw_tmp = raw_temp_path(dest);
        let gz_tmp = naming::temp_path(dest);
        let invocation = self.build_invocation(connection, options, &raw_tmp)?;

        info!(
            "Dumping {} to {} (schema: {}, data: {})",
            connection.target_key(),
            dest.display(),
            options.include_schema,
            options.include_data
        );

        let result = self
            .dump_and_promote(invocation, &raw_tmp, &gz_tmp, dest, cancel)
            .await;
        // The raw dump is never needed once compression has been attempted.
        compress::remove_temp_files(&[raw_tmp]).await;

        let (size_bytes, modified_at) = match result {
            Ok(promoted) => promoted,
            Err(e) => {
                warn!("Dump of {} failed: {e}", connection.target_key());
                compress::remove_temp_files(&[gz_tmp]).await;
                return Err(e);
            }
        };
        info!("Dump complete: {} ({size_bytes} bytes)", dest.display());

        Ok(SnapshotRecord {
            file_name: file_name_of(dest),
            size_bytes,
            created_at,
            modified_at,
            format: SnapshotFormat::Sql,
        })
    }

    async fn dump_and_promote(
        &self,
        invocation: ToolInvocation,
        raw_tmp: &Path,
        gz_tmp: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<(u64, SystemTime), SnapshotError> {
        let output = self.runner.run(invocation, cancel).await?;
        output.check(&self.program)?;

        debug!("Compressing {} into {}", raw_tmp.display(), gz_tmp.display());
        compress::gzip_file(raw_tmp, gz_tmp).await?;
        compress::promote(gz_tmp, dest).await
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Raw (uncompressed) temp path for a final `.sql.gz` destination.
pub fn raw_temp_path(dest: &Path) -> PathBuf {
    naming::temp_path(&dest.with_extension(""))
}
