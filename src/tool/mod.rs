//! External tool invocation.
//!
//! Dump and restore shell out to `pg_dump`/`psql`. Every invocation is an
//! argument vector plus an environment; nothing is ever passed through a shell
//! and credentials only travel in the environment. The [`ToolRunner`] trait is
//! the seam tests use to observe or fake the external process.

mod process;

pub use process::ProcessRunner;

use std::ffi::OsString;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error_handling::SnapshotError;

/// Longest stderr tail kept in error messages.
const STDERR_TAIL_BYTES: usize = 4096;

/// One run of an external program.
#[derive(Clone)]
pub struct ToolInvocation {
    /// Program name or path
    pub program: String,
    /// Argument vector (no shell interpretation)
    pub args: Vec<OsString>,
    /// Extra environment variables, including credentials
    pub env: Vec<(String, String)>,
    /// Kill the process if it runs longer than this
    pub timeout: Option<Duration>,
}

// Environment values can carry credentials; only the keys are printed.
impl std::fmt::Debug for ToolInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("ToolInvocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ToolInvocation {
    /// Returns the value of a `--name=value` argument, if present.
    pub fn flag_value(&self, name: &str) -> Option<String> {
        let prefix = format!("{name}=");
        self.args
            .iter()
            .filter_map(|a| a.to_str())
            .find_map(|a| a.strip_prefix(&prefix).map(str::to_string))
    }
}

/// Result of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (`None` when terminated by a signal)
    pub exit_code: Option<i32>,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Converts a non-zero exit into a `ToolInvocation` error.
    pub fn check(self, tool: &str) -> Result<(), SnapshotError> {
        if self.success() {
            return Ok(());
        }
        let status = match self.exit_code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        let stderr = stderr_tail(self.stderr.trim());
        let message = if stderr.is_empty() {
            status
        } else {
            format!("{status}: {stderr}")
        };
        Err(SnapshotError::ToolInvocation {
            tool: tool.to_string(),
            message,
        })
    }
}

fn stderr_tail(stderr: &str) -> &str {
    if stderr.len() <= STDERR_TAIL_BYTES {
        return stderr;
    }
    let mut start = stderr.len() - STDERR_TAIL_BYTES;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    &stderr[start..]
}

/// Runs external programs.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs the invocation to completion.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::ToolInvocation` if the program cannot be started
    /// and `SnapshotError::Cancelled` if it was killed because `cancel` fired or
    /// its timeout expired. A non-zero exit is *not* an error here; callers
    /// inspect [`ToolOutput`].
    async fn run(
        &self,
        invocation: ToolInvocation,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, SnapshotError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::ErrorKind;

    #[test]
    fn test_debug_hides_env_values() {
        let invocation = ToolInvocation {
            program: "pg_dump".into(),
            args: vec!["--no-owner".into()],
            env: vec![("PGPASSWORD".into(), "hunter2".into())],
            timeout: None,
        };
        let debug = format!("{invocation:?}");
        assert!(debug.contains("PGPASSWORD"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_flag_value() {
        let invocation = ToolInvocation {
            program: "pg_dump".into(),
            args: vec!["--no-owner".into(), "--file=/tmp/out.sql.tmp".into()],
            env: Vec::new(),
            timeout: None,
        };
        assert_eq!(
            invocation.flag_value("--file").as_deref(),
            Some("/tmp/out.sql.tmp")
        );
        assert_eq!(invocation.flag_value("--table"), None);
    }

    #[test]
    fn test_check_success() {
        let output = ToolOutput {
            exit_code: Some(0),
            stderr: "warning only".into(),
        };
        assert!(output.check("psql").is_ok());
    }

    #[test]
    fn test_check_failure_carries_stderr() {
        let output = ToolOutput {
            exit_code: Some(1),
            stderr: "FATAL: password authentication failed\n".into(),
        };
        let err = output.check("pg_dump").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolInvocation);
        assert_eq!(
            err.to_string(),
            "pg_dump failed: exit status 1: FATAL: password authentication failed"
        );
    }

    #[test]
    fn test_check_signal() {
        let output = ToolOutput {
            exit_code: None,
            stderr: String::new(),
        };
        let err = output.check("psql").unwrap_err();
        assert_eq!(err.to_string(), "psql failed: terminated by signal");
    }

    #[test]
    fn test_stderr_tail_keeps_end() {
        let long = format!("{}END", "é".repeat(STDERR_TAIL_BYTES));
        let tail = stderr_tail(&long);
        assert!(tail.len() <= STDERR_TAIL_BYTES);
        assert!(tail.ends_with("END"));
    }
}
