//! Snapshot file naming.
//!
//! File names have the form `backup_<RFC3339 with ':' replaced by '-'>.<ext>`,
//! e.g. `backup_2026-10-17T09-30-00.125Z.sql.gz`. In-progress files carry an
//! additional `.tmp` suffix until they are promoted.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error_handling::SnapshotError;
use crate::models::SnapshotFormat;

pub const FILE_PREFIX: &str = "backup_";
pub const TEMP_SUFFIX: &str = ".tmp";

/// Builds the final file name for a snapshot created at `created_at`.
pub fn snapshot_file_name(created_at: DateTime<Utc>, format: SnapshotFormat) -> String {
    let stamp = created_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");
    match format.extension() {
        Some(ext) => format!("{FILE_PREFIX}{stamp}.{ext}"),
        None => format!("{FILE_PREFIX}{stamp}"),
    }
}

/// In-progress name for `final_path` (`<final>.tmp`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Whether the name belongs to an operation that has not finished yet.
pub fn is_in_progress(file_name: &str) -> bool {
    file_name.ends_with(TEMP_SUFFIX)
}

/// Classifies a file purely from its extension.
pub fn classify(file_name: &str) -> SnapshotFormat {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".sql.gz") {
        SnapshotFormat::Sql
    } else if lower.ends_with(".xlsx") {
        SnapshotFormat::Spreadsheet
    } else {
        SnapshotFormat::Unknown
    }
}

/// Recovers the creation timestamp encoded in a snapshot file name.
///
/// Returns `None` for names that do not follow the naming scheme.
pub fn parse_created_at(file_name: &str) -> Option<DateTime<Utc>> {
    let rest = file_name.strip_prefix(FILE_PREFIX)?;
    // The stamp ends at the 'Z' that terminates the UTC offset.
    let stamp_end = rest.find('Z')?;
    let stamp = &rest[..stamp_end];
    let (date, time) = stamp.split_once('T')?;
    let restored = format!("{date}T{}Z", time.replace('-', ":"));
    DateTime::parse_from_rfc3339(&restored)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Resolves a caller-supplied file name inside `root`.
///
/// # Errors
///
/// Returns `SnapshotError::PathTraversal` if the name is empty, absolute, or
/// contains anything other than a single normal path component.
pub fn resolve_in_root(root: &Path, file_name: &str) -> Result<PathBuf, SnapshotError> {
    let candidate = Path::new(file_name);
    let mut components = candidate.components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if file_name.is_empty()
        || !single_normal
        || file_name.contains('/')
        || file_name.contains('\\')
    {
        return Err(SnapshotError::PathTraversal(file_name.to_string()));
    }
    Ok(root.join(candidate))
}
