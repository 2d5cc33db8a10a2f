//! Spreadsheet exports.
//!
//! One worksheet per table plus a final Summary sheet. Tables are read by a
//! bounded pool of workers; results are slotted by table index so the
//! workbook always lists tables in catalog order, whatever order the reads
//! complete in. A table that fails to read or write gets a diagnostic sheet
//! and a [`PartialExportWarning`] instead of aborting the export.

pub mod postgres;
pub mod source;
pub mod sqlite;
pub mod workbook;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::catalog::naming;
use crate::dump::{compress, file_name_of};
use crate::error_handling::{PartialExportWarning, SnapshotError};
use crate::models::{BackupOptions, SnapshotFormat, SnapshotRecord, TableSnapshot};

pub use source::{CellValue, TableRows, TableSource};
use workbook::TableOutcome;

/// Result of a spreadsheet export.
#[derive(Debug, Clone)]
pub struct TabularExport {
    pub record: SnapshotRecord,
    pub tables: Vec<TableSnapshot>,
    pub warnings: Vec<PartialExportWarning>,
}

/// Writes `.xlsx` snapshots by querying table rows directly.
pub struct TabularExporter {
    source: Arc<dyn TableSource>,
    workers: usize,
    max_rows: usize,
}

impl TabularExporter {
    pub fn new(source: Arc<dyn TableSource>, workers: usize, max_rows: usize) -> Self {
        Self {
            source,
            workers: workers.max(1),
            max_rows,
        }
    }

    /// Exports the selected tables to `dest` (an `.xlsx` path).
    ///
    /// `options.include_schema`/`include_data` are ignored; spreadsheet exports
    /// are always data-only.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the table list cannot be read, `Cancelled` if the
    /// token fires before all tables were read, and `Io` if the workbook
    /// cannot be saved or moved into place. Per-table failures are not errors.
    pub async fn export(
        &self,
        options: &BackupOptions,
        dest: &Path,
        created_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<TabularExport, SnapshotError> {
        let catalog_tables = self.source.list_tables().await?;
        let mut warnings = Vec::new();

        let targets: Vec<String> = if options.table_filter.is_empty() {
            catalog_tables
        } else {
            for missing in options
                .table_filter
                .iter()
                .filter(|t| !catalog_tables.contains(t))
            {
                warn!("Requested table {missing} is not a base table; skipping");
                warnings.push(PartialExportWarning {
                    table: missing.clone(),
                    message: "table not found".to_string(),
                });
            }
            catalog_tables
                .into_iter()
                .filter(|t| options.table_filter.contains(t))
                .collect()
        };

        info!(
            "Exporting {} table(s) to {} with {} worker(s)",
            targets.len(),
            dest.display(),
            self.workers
        );

        let outcomes = self.read_tables(&targets, cancel).await?;

        let temp = naming::temp_path(dest);
        let report = {
            let temp = temp.clone();
            tokio::task::spawn_blocking(move || workbook::write_workbook(&temp, outcomes))
                .await
                .map_err(|e| SnapshotError::Io {
                    context: "workbook writer".to_string(),
                    source: std::io::Error::other(e.to_string()),
                })
                .and_then(|r| r)
        };
        let report = match report {
            Ok(report) => report,
            Err(e) => {
                compress::remove_temp_files(&[temp]).await;
                return Err(e);
            }
        };
        let (size_bytes, modified_at) = match compress::promote(&temp, dest).await {
            Ok(promoted) => promoted,
            Err(e) => {
                compress::remove_temp_files(&[temp]).await;
                return Err(e);
            }
        };

        warnings.extend(report.warnings);
        info!(
            "Spreadsheet export complete: {} ({size_bytes} bytes, {} warning(s))",
            dest.display(),
            warnings.len()
        );

        Ok(TabularExport {
            record: SnapshotRecord {
                file_name: file_name_of(dest),
                size_bytes,
                created_at,
                modified_at,
                format: SnapshotFormat::Spreadsheet,
            },
            tables: report.tables,
            warnings,
        })
    }

    /// Reads every table through the worker pool, returning outcomes in input order.
    async fn read_tables(
        &self,
        tables: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<TableOutcome>, SnapshotError> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let fetch_limit = self.max_rows.saturating_add(1);
        let mut tasks = FuturesUnordered::new();

        for (index, table) in tables.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let source = Arc::clone(&self.source);
            let cancel = cancel.clone();
            let table = table.clone();
            tasks.push(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, None);
                };
                // Checked between tables: a started read is allowed to finish.
                if cancel.is_cancelled() {
                    return (index, None);
                }
                debug!("Reading table {table}");
                (index, Some(source.read_table(&table, fetch_limit).await))
            });
        }

        let mut slots: Vec<Option<Result<TableRows, SnapshotError>>> =
            (0..tables.len()).map(|_| None).collect();
        while let Some((index, result)) = tasks.next().await {
            slots[index] = result;
        }

        // Only a table skipped because of the token makes the export incomplete.
        if cancel.is_cancelled() && slots.iter().any(Option::is_none) {
            return Err(SnapshotError::Cancelled(
                "spreadsheet export cancelled between tables".to_string(),
            ));
        }

        let mut outcomes = Vec::with_capacity(tables.len());
        for (table, slot) in tables.iter().zip(slots) {
            let outcome = match slot {
                Some(Ok(mut rows)) => {
                    let truncated = rows.rows.len() > self.max_rows;
                    if truncated {
                        rows.rows.truncate(self.max_rows);
                        warn!(
                            "Table {table} has more than {} rows; worksheet truncated",
                            self.max_rows
                        );
                    }
                    TableOutcome {
                        table: table.clone(),
                        result: Ok(rows),
                        truncated,
                    }
                }
                Some(Err(e)) => TableOutcome {
                    table: table.clone(),
                    result: Err(e.to_string()),
                    truncated: false,
                },
                None => TableOutcome {
                    table: table.clone(),
                    result: Err("table was not read".to_string()),
                    truncated: false,
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
