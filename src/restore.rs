//! Replays SQL dumps onto the target database with `psql`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::connection::ConnectionInfo;
use crate::dump::{compress, raw_temp_path};
use crate::error_handling::SnapshotError;
use crate::tool::{ToolInvocation, ToolRunner};

/// What kind of file a restore was asked to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestoreInput {
    Compressed,
    Plain,
}

fn classify_input(path: &Path) -> Result<RestoreInput, SnapshotError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.ends_with(".sql.gz") {
        Ok(RestoreInput::Compressed)
    } else if name.ends_with(".sql") {
        Ok(RestoreInput::Plain)
    } else if name.ends_with(".xlsx") {
        Err(SnapshotError::Format(format!(
            "{name} is a spreadsheet export and cannot be restored"
        )))
    } else {
        Err(SnapshotError::Format(format!(
            "{name} is not a SQL dump (.sql.gz or .sql)"
        )))
    }
}

/// Applies a previously produced dump to the target database.
pub struct RestoreExecutor {
    runner: Arc<dyn ToolRunner>,
    program: String,
    timeout: Option<Duration>,
}

impl RestoreExecutor {
    pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            runner,
            program: program.into(),
            timeout,
        }
    }

    pub fn build_invocation(&self, connection: &ConnectionInfo, sql_path: &Path) -> ToolInvocation {
        let mut file_arg = OsString::from("--file=");
        file_arg.push(sql_path.as_os_str());
        ToolInvocation {
            program: self.program.clone(),
            args: vec![
                "--no-psqlrc".into(),
                "--set=ON_ERROR_STOP=1".into(),
                "--single-transaction".into(),
                file_arg,
            ],
            env: connection.tool_env(),
            timeout: self.timeout,
        }
    }

    /// Restores `source` onto the database described by `connection`.
    ///
    /// Spreadsheets and unknown file types are rejected before anything
    /// touches the filesystem or starts a process. A compressed dump is
    /// decompressed next to itself as `<name>.sql.tmp`; that file is removed
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// `Format` for non-SQL files or corrupt gzip data, `NotFound` if
    /// `source` does not exist, `ToolInvocation` if `psql` is missing or exits
    /// non-zero, `Cancelled` on timeout or cancellation.
    pub async fn restore(
        &self,
        connection: &ConnectionInfo,
        source: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), SnapshotError> {
        let input = classify_input(source)?;

        match tokio::fs::metadata(source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(SnapshotError::NotFound(source.display().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound(source.display().to_string()))
            }
            Err(e) => return Err(SnapshotError::io("stat", source, e)),
        }

        info!(
            "Restoring {} from {}",
            connection.target_key(),
            source.display()
        );

        match input {
            RestoreInput::Plain => self.replay(connection, source, cancel).await,
            RestoreInput::Compressed => {
                let scratch: PathBuf = raw_temp_path(source);
                let result = async {
                    compress::gunzip_file(source, &scratch).await?;
                    self.replay(connection, &scratch, cancel).await
                }
                .await;
                compress::remove_temp_files(&[scratch]).await;
                result
            }
        }
    }

    async fn replay(
        &self,
        connection: &ConnectionInfo,
        sql_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), SnapshotError> {
        let invocation = self.build_invocation(connection, sql_path);
        let output = self.runner.run(invocation, cancel).await?;
        if let Err(e) = output.check(&self.program) {
            warn!("Restore of {} failed: {e}", connection.target_key());
            return Err(e);
        }
        info!("Restore of {} complete", connection.target_key());
        Ok(())
    }
}
