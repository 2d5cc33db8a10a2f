//! Subprocess runner backed by `tokio::process`.

use std::io::ErrorKind as IoErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{ToolInvocation, ToolOutput, ToolRunner};
use crate::error_handling::SnapshotError;

/// Runs tools as real child processes.
///
/// The child is spawned with `kill_on_drop`, so abandoning the wait (timeout
/// or cancellation) kills it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: ToolInvocation,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, SnapshotError> {
        debug!("Running {:?}", invocation);

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SnapshotError::ToolInvocation {
                tool: invocation.program.clone(),
                message: if e.kind() == IoErrorKind::NotFound {
                    "program not found on PATH".to_string()
                } else {
                    format!("failed to start: {e}")
                },
            })?;

        let deadline = async {
            match invocation.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let output = tokio::select! {
            result = child.wait_with_output() => result.map_err(|e| SnapshotError::ToolInvocation {
                tool: invocation.program.clone(),
                message: format!("failed to collect output: {e}"),
            })?,
            _ = deadline => {
                return Err(SnapshotError::Cancelled(format!(
                    "{} killed after exceeding its {:?} timeout",
                    invocation.program,
                    invocation.timeout.unwrap_or_default()
                )));
            }
            _ = cancel.cancelled() => {
                return Err(SnapshotError::Cancelled(format!(
                    "{} killed on cancellation",
                    invocation.program
                )));
            }
        };

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
