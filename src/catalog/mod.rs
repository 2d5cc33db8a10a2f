//! Snapshot catalog.
//!
//! Lists the files in the backup root and classifies them by extension.
//! Unknown and in-progress files are reported rather than hidden so that
//! orphans stay visible for operator cleanup.

pub mod naming;

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;

use crate::error_handling::SnapshotError;
use crate::models::SnapshotRecord;

/// Reads snapshot metadata from the backup root directory.
#[derive(Debug, Clone)]
pub struct CatalogReader {
    root: PathBuf,
}

impl CatalogReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists every regular file in the backup root, newest first.
    ///
    /// A backup root that does not exist yet yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Io` if the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<SnapshotRecord>, SnapshotError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SnapshotError::io("read directory", &self.root, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SnapshotError::io("read directory", &self.root, e))?
        {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Removed between read_dir and stat (e.g. by a concurrent sweep)
                Err(e) if e.kind() == IoErrorKind::NotFound => continue,
                Err(e) => return Err(SnapshotError::io("stat", &path, e)),
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                debug!("Skipping non UTF-8 file name in {}", self.root.display());
                continue;
            };
            let modified_at = metadata
                .modified()
                .map_err(|e| SnapshotError::io("read mtime of", &path, e))?;
            let created_at = naming::parse_created_at(&file_name)
                .unwrap_or_else(|| DateTime::<Utc>::from(modified_at));

            records.push(SnapshotRecord {
                format: naming::classify(&file_name),
                file_name,
                size_bytes: metadata.len(),
                created_at,
                modified_at,
            });
        }

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(records)
    }

    /// Looks up a single snapshot by file name.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::PathTraversal` for names that escape the root and
    /// `SnapshotError::NotFound` if no such regular file exists.
    pub async fn find(&self, file_name: &str) -> Result<SnapshotRecord, SnapshotError> {
        naming::resolve_in_root(&self.root, file_name)?;
        self.list()
            .await?
            .into_iter()
            .find(|r| r.file_name == file_name)
            .ok_or_else(|| SnapshotError::NotFound(file_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SnapshotFormat;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let catalog = CatalogReader::new(dir.path().join("not-created-yet"));
        assert!(catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sorted_newest_first_and_classified() {
        let dir = TempDir::new().unwrap();
        let older = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let older_name = naming::snapshot_file_name(older, SnapshotFormat::Sql);
        let newer_name = naming::snapshot_file_name(newer, SnapshotFormat::Spreadsheet);
        std::fs::write(dir.path().join(&older_name), b"dump").unwrap();
        std::fs::write(dir.path().join(&newer_name), b"sheet").unwrap();
        std::fs::write(dir.path().join("stray.bin"), b"?").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let records = CatalogReader::new(dir.path()).list().await.unwrap();
        assert_eq!(records.len(), 3, "directories are skipped, unknown files kept");

        let named: Vec<_> = records
            .iter()
            .filter(|r| r.file_name.starts_with(naming::FILE_PREFIX))
            .collect();
        assert_eq!(named[0].file_name, newer_name);
        assert_eq!(named[0].format, SnapshotFormat::Spreadsheet);
        assert_eq!(named[0].created_at, newer);
        assert_eq!(named[1].file_name, older_name);
        assert_eq!(named[1].format, SnapshotFormat::Sql);
        assert_eq!(named[1].size_bytes, 4);

        let stray = records.iter().find(|r| r.file_name == "stray.bin").unwrap();
        assert_eq!(stray.format, SnapshotFormat::Unknown);
    }

    #[tokio::test]
    async fn test_find_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let catalog = CatalogReader::new(dir.path());
        let err = catalog.find("backup_nope.sql.gz").await.unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_find_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let catalog = CatalogReader::new(dir.path());
        let err = catalog.find("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, SnapshotError::PathTraversal(_)));
    }
}
