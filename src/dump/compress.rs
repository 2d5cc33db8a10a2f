//! Gzip helpers and temp-file promotion.
//!
//! Compression runs on the blocking pool; the dump files can be large.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;

use crate::error_handling::SnapshotError;

/// Compresses `source` into `dest`, fsyncing the result.
pub async fn gzip_file(source: &Path, dest: &Path) -> Result<u64, SnapshotError> {
    let (source, dest) = (source.to_path_buf(), dest.to_path_buf());
    run_blocking(move || {
        let input = File::open(&source).map_err(|e| SnapshotError::io("open", &source, e))?;
        let output = File::create(&dest).map_err(|e| SnapshotError::io("create", &dest, e))?;

        let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
        io::copy(&mut BufReader::new(input), &mut encoder)
            .map_err(|e| SnapshotError::io("compress into", &dest, e))?;
        let mut writer = encoder
            .finish()
            .map_err(|e| SnapshotError::io("finish", &dest, e))?;
        writer
            .flush()
            .map_err(|e| SnapshotError::io("flush", &dest, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| SnapshotError::io("flush", &dest, e.into_error()))?;
        file.sync_all()
            .map_err(|e| SnapshotError::io("sync", &dest, e))?;
        let len = file
            .metadata()
            .map_err(|e| SnapshotError::io("stat", &dest, e))?
            .len();
        Ok(len)
    })
    .await
}

/// Decompresses `source` into `dest`.
pub async fn gunzip_file(source: &Path, dest: &Path) -> Result<u64, SnapshotError> {
    let (source, dest) = (source.to_path_buf(), dest.to_path_buf());
    run_blocking(move || {
        let input = File::open(&source).map_err(|e| SnapshotError::io("open", &source, e))?;
        let output = File::create(&dest).map_err(|e| SnapshotError::io("create", &dest, e))?;

        let mut decoder = GzDecoder::new(BufReader::new(input));
        let mut writer = BufWriter::new(output);
        let copied = io::copy(&mut decoder, &mut writer).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidInput || e.kind() == io::ErrorKind::InvalidData {
                SnapshotError::Format(format!("{} is not a valid gzip file: {e}", source.display()))
            } else {
                SnapshotError::io("decompress", &source, e)
            }
        })?;
        writer
            .flush()
            .map_err(|e| SnapshotError::io("flush", &dest, e))?;
        Ok(copied)
    })
    .await
}

/// Atomically moves a finished temp file to its final name.
///
/// Returns the size and mtime of the promoted file. Both are read from the temp
/// file before the rename, so nothing can fail once the final name exists.
pub async fn promote(temp: &Path, final_path: &Path) -> Result<(u64, SystemTime), SnapshotError> {
    let metadata = tokio::fs::metadata(temp)
        .await
        .map_err(|e| SnapshotError::io("stat", temp, e))?;
    let modified = metadata
        .modified()
        .map_err(|e| SnapshotError::io("read mtime of", temp, e))?;
    tokio::fs::rename(temp, final_path)
        .await
        .map_err(|e| SnapshotError::io("rename into place", final_path, e))?;
    Ok((metadata.len(), modified))
}

/// Best-effort removal of temporary files; absent files are ignored.
pub async fn remove_temp_files(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed temporary file {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove temporary file {}: {e}", path.display()),
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, SnapshotError>
where
    F: FnOnce() -> Result<T, SnapshotError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SnapshotError::Io {
            context: "compression worker".to_string(),
            source: io::Error::other(e.to_string()),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::ErrorKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_gzip_then_gunzip_restores_content() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("dump.sql");
        let packed = dir.path().join("dump.sql.gz");
        let unpacked = dir.path().join("dump.restored.sql");
        let sql = "CREATE TABLE patients (id int);\n".repeat(200);
        std::fs::write(&raw, &sql).unwrap();

        let packed_len = gzip_file(&raw, &packed).await.unwrap();
        assert!(packed_len > 0);
        assert!(packed_len < sql.len() as u64, "repetitive SQL should compress");

        gunzip_file(&packed, &unpacked).await.unwrap();
        assert_eq!(std::fs::read_to_string(&unpacked).unwrap(), sql);
    }

    #[tokio::test]
    async fn test_gunzip_rejects_plain_text() {
        let dir = TempDir::new().unwrap();
        let fake = dir.path().join("fake.sql.gz");
        std::fs::write(&fake, "SELECT 1;").unwrap();
        let err = gunzip_file(&fake, &dir.path().join("out.sql"))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Format | ErrorKind::Io));
    }

    #[tokio::test]
    async fn test_promote_reports_metadata_of_final_file() {
        let dir = TempDir::new().unwrap();
        let temp = dir.path().join("backup_a.sql.gz.tmp");
        let dest = dir.path().join("backup_a.sql.gz");
        std::fs::write(&temp, b"payload").unwrap();

        let (len, modified) = promote(&temp, &dest).await.unwrap();
        assert!(!temp.exists());
        let on_disk = std::fs::metadata(&dest).unwrap();
        assert_eq!(len, on_disk.len());
        assert_eq!(modified, on_disk.modified().unwrap());
    }

    #[tokio::test]
    async fn test_promote_of_missing_temp_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("backup_b.xlsx");
        let err = promote(&dir.path().join("backup_b.xlsx.tmp"), &dest)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_remove_temp_files_ignores_missing() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("a.tmp");
        std::fs::write(&present, b"x").unwrap();
        remove_temp_files(&[present.clone(), dir.path().join("missing.tmp")]).await;
        assert!(!present.exists());
    }
}
