//! Age-based retention cleanup.
//!
//! A sweep deletes every file in the backup root whose modification time is
//! older than `now - max_age_days`:
//! - In-progress files (`*.tmp`) are never touched, whatever their age
//! - A failed deletion is recorded and the sweep moves on
//! - Sweeps never take the backup/restore lease, so they cannot deadlock
//!   against a long-running dump

mod scheduler;

pub use scheduler::start_retention_task;

use std::io::ErrorKind as IoErrorKind;
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::catalog::{naming, CatalogReader};
use crate::error_handling::SnapshotError;
use crate::models::RetentionPolicy;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Outcome of one retention sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// File names that were deleted
    pub deleted: Vec<String>,
    /// File names that could not be deleted, with the reason
    pub failed: Vec<(String, SnapshotError)>,
}

/// Deletes expired snapshot files.
#[derive(Debug)]
pub struct RetentionManager {
    catalog: CatalogReader,
    // Serializes sweeps against each other only.
    sweep_lock: Mutex<()>,
}

impl RetentionManager {
    pub fn new(catalog: CatalogReader) -> Self {
        Self {
            catalog,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Runs a sweep against the current wall clock.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backup root cannot be listed; individual
    /// deletion failures are reported in [`SweepReport::failed`].
    pub async fn sweep(&self, policy: RetentionPolicy) -> Result<SweepReport, SnapshotError> {
        self.sweep_at(policy, SystemTime::now()).await
    }

    /// Runs a sweep treating `now` as the current time.
    pub async fn sweep_at(
        &self,
        policy: RetentionPolicy,
        now: SystemTime,
    ) -> Result<SweepReport, SnapshotError> {
        let _guard = self.sweep_lock.lock().await;

        let max_age = Duration::from_secs(u64::from(policy.max_age_days) * SECS_PER_DAY);
        let Some(cutoff) = now.checked_sub(max_age) else {
            debug!("Retention cutoff precedes the epoch; nothing to sweep");
            return Ok(SweepReport::default());
        };

        let mut report = SweepReport::default();
        for record in self.catalog.list().await? {
            if naming::is_in_progress(&record.file_name) {
                debug!("Skipping in-progress file {}", record.file_name);
                continue;
            }
            if record.modified_at >= cutoff {
                continue;
            }

            let path = self.catalog.root().join(&record.file_name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!("Deleted expired snapshot {}", record.file_name);
                    report.deleted.push(record.file_name);
                }
                Err(e) if e.kind() == IoErrorKind::NotFound => {
                    debug!("{} disappeared before it could be swept", record.file_name);
                }
                Err(e) => {
                    warn!("Failed to delete expired snapshot {}: {e}", record.file_name);
                    let err = SnapshotError::io("remove", &path, e);
                    report.failed.push((record.file_name, err));
                }
            }
        }

        info!(
            "Retention sweep (max age {} days): {} deleted, {} failed",
            policy.max_age_days,
            report.deleted.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    fn whole_second_now() -> SystemTime {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn write_with_age(dir: &TempDir, name: &str, now: SystemTime, age_days: u64) {
        let path = dir.path().join(name);
        std::fs::write(&path, b"x").unwrap();
        let mtime = now - Duration::from_secs(age_days * SECS_PER_DAY);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_skips_in_progress_files() {
        let dir = TempDir::new().unwrap();
        let now = whole_second_now();
        write_with_age(&dir, "backup_old.sql.gz.tmp", now, 400);
        write_with_age(&dir, "backup_old.sql.gz", now, 400);

        let manager = RetentionManager::new(CatalogReader::new(dir.path()));
        let report = manager
            .sweep_at(RetentionPolicy { max_age_days: 30 }, now)
            .await
            .unwrap();

        assert_eq!(report.deleted, vec!["backup_old.sql.gz".to_string()]);
        assert!(dir.path().join("backup_old.sql.gz.tmp").exists());
    }

    #[tokio::test]
    async fn test_sweep_deletes_unknown_files_too() {
        let dir = TempDir::new().unwrap();
        let now = whole_second_now();
        write_with_age(&dir, "orphan.dat", now, 90);

        let manager = RetentionManager::new(CatalogReader::new(dir.path()));
        let report = manager
            .sweep_at(RetentionPolicy { max_age_days: 30 }, now)
            .await
            .unwrap();
        assert_eq!(report.deleted, vec!["orphan.dat".to_string()]);
    }

    #[tokio::test]
    async fn test_sweep_on_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let manager = RetentionManager::new(CatalogReader::new(dir.path().join("absent")));
        let report = manager
            .sweep(RetentionPolicy { max_age_days: 1 })
            .await
            .unwrap();
        assert!(report.deleted.is_empty());
        assert!(report.failed.is_empty());
    }
}
