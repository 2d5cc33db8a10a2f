//! Workbook assembly.
//!
//! Every table becomes its own worksheet, built standalone and only pushed to
//! the workbook once it is complete, so a table that fails mid-write can be
//! swapped for a diagnostic sheet without leaving half a sheet behind. The
//! Summary sheet is built from the same per-table outcomes.

use std::collections::HashSet;
use std::path::Path;

use log::warn;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use super::source::{CellValue, TableRows};
use crate::error_handling::{PartialExportWarning, SnapshotError};
use crate::models::TableSnapshot;

pub const SUMMARY_SHEET: &str = "Summary";

const MAX_SHEET_NAME_CHARS: usize = 31;
const MAX_CELL_CHARS: usize = 32_767;
const MAX_COLUMNS: usize = 16_384;
const MAX_COLUMN_WIDTH: usize = 60;
const MIN_COLUMN_WIDTH: usize = 6;
/// Largest integer an Excel number (an f64) holds exactly.
const MAX_EXACT_INTEGER: u64 = 1 << 53;

/// What happened when reading one table.
#[derive(Debug)]
pub struct TableOutcome {
    pub table: String,
    pub result: Result<TableRows, String>,
    pub truncated: bool,
}

/// Per-table summaries and warnings produced while writing the workbook.
#[derive(Debug, Default)]
pub struct WorkbookReport {
    pub tables: Vec<TableSnapshot>,
    pub warnings: Vec<PartialExportWarning>,
}

/// Writes all table sheets plus the Summary sheet to `path`.
///
/// # Errors
///
/// Fails only if the Summary sheet or the file itself cannot be written;
/// per-table failures become diagnostic sheets and warnings.
pub fn write_workbook(path: &Path, outcomes: Vec<TableOutcome>) -> Result<WorkbookReport, SnapshotError> {
    let mut workbook = Workbook::new();
    let mut namer = SheetNamer::new();
    let mut report = WorkbookReport::default();

    for outcome in outcomes {
        let sheet_name = namer.unique(&outcome.table);
        let built = match &outcome.result {
            Ok(rows) => table_worksheet(&sheet_name, rows).map_err(|e| e.to_string()),
            Err(message) => Err(message.clone()),
        };

        let snapshot = match built {
            Ok(sheet) => {
                workbook.push_worksheet(sheet);
                let rows = outcome.result.as_ref().ok();
                TableSnapshot {
                    table_name: outcome.table,
                    row_count: rows.map(|r| r.rows.len()).unwrap_or_default(),
                    columns: rows.map(|r| r.columns.clone()).unwrap_or_default(),
                    truncated: outcome.truncated,
                    export_error: None,
                }
            }
            Err(message) => {
                warn!("Exporting table {} failed: {message}", outcome.table);
                workbook.push_worksheet(diagnostic_worksheet(&sheet_name, &message)?);
                report.warnings.push(PartialExportWarning {
                    table: outcome.table.clone(),
                    message: message.clone(),
                });
                TableSnapshot {
                    table_name: outcome.table,
                    row_count: 0,
                    columns: Vec::new(),
                    truncated: false,
                    export_error: Some(message),
                }
            }
        };
        report.tables.push(snapshot);
    }

    workbook.push_worksheet(summary_worksheet(&report.tables)?);
    workbook.save(path)?;
    Ok(report)
}

fn header_format() -> Format {
    Format::new().set_bold()
}

fn table_worksheet(name: &str, data: &TableRows) -> Result<Worksheet, SnapshotError> {
    if data.columns.len() > MAX_COLUMNS {
        return Err(SnapshotError::Format(format!(
            "{} columns exceed the worksheet limit of {MAX_COLUMNS}",
            data.columns.len()
        )));
    }

    let mut sheet = Worksheet::new();
    sheet.set_name(name)?;
    let bold = header_format();
    let mut widths: Vec<usize> = data.columns.iter().map(|c| c.chars().count()).collect();

    for (col, column) in data.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, column.as_str(), &bold)?;
    }

    for (index, values) in data.rows.iter().enumerate() {
        let row = u32::try_from(index + 1).map_err(|_| {
            SnapshotError::Format("row count exceeds the worksheet limit".to_string())
        })?;
        for (col, value) in values.iter().enumerate().take(data.columns.len()) {
            write_cell(&mut sheet, row, col as u16, value)?;
            widths[col] = widths[col].max(value.display_len());
        }
    }

    for (col, width) in widths.into_iter().enumerate() {
        let width = width.clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH) + 2;
        sheet.set_column_width(col as u16, width as f64)?;
    }
    if !data.columns.is_empty() {
        sheet.set_freeze_panes(1, 0)?;
    }
    Ok(sheet)
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> Result<(), XlsxError> {
    match value {
        CellValue::Null => {}
        CellValue::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        CellValue::Integer(i) if i.unsigned_abs() <= MAX_EXACT_INTEGER => {
            sheet.write_number(row, col, *i as f64)?;
        }
        CellValue::Integer(i) => {
            sheet.write_string(row, col, i.to_string())?;
        }
        CellValue::Float(f) if f.is_finite() => {
            sheet.write_number(row, col, *f)?;
        }
        CellValue::Float(f) => {
            sheet.write_string(row, col, f.to_string())?;
        }
        CellValue::Text(s) => {
            sheet.write_string(row, col, clip(s))?;
        }
    }
    Ok(())
}

fn clip(text: &str) -> &str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn diagnostic_worksheet(name: &str, message: &str) -> Result<Worksheet, SnapshotError> {
    let mut sheet = Worksheet::new();
    sheet.set_name(name)?;
    sheet.write_string_with_format(0, 0, "error", &header_format())?;
    sheet.write_string(1, 0, clip(&format!("Failed to export table: {message}")))?;
    sheet.set_column_width(0, MAX_COLUMN_WIDTH as f64)?;
    Ok(sheet)
}

fn summary_worksheet(tables: &[TableSnapshot]) -> Result<Worksheet, SnapshotError> {
    let mut sheet = Worksheet::new();
    sheet.set_name(SUMMARY_SHEET)?;
    let bold = header_format();
    for (col, title) in ["Table", "Rows", "Columns", "Truncated", "Warning"]
        .iter()
        .enumerate()
    {
        sheet.write_string_with_format(0, col as u16, *title, &bold)?;
    }

    for (index, table) in tables.iter().enumerate() {
        let row = (index + 1) as u32;
        sheet.write_string(row, 0, table.table_name.as_str())?;
        sheet.write_number(row, 1, table.row_count as f64)?;
        sheet.write_number(row, 2, table.columns.len() as f64)?;
        sheet.write_boolean(row, 3, table.truncated)?;
        if let Some(error) = &table.export_error {
            sheet.write_string(row, 4, clip(error))?;
        }
    }

    sheet.set_column_width(0, 30.0)?;
    sheet.set_column_width(4, MAX_COLUMN_WIDTH as f64)?;
    sheet.set_freeze_panes(1, 0)?;
    Ok(sheet)
}

/// Hands out valid, unique (case-insensitive) worksheet names.
#[derive(Debug)]
pub struct SheetNamer {
    used: HashSet<String>,
}

impl SheetNamer {
    pub fn new() -> Self {
        let mut used = HashSet::new();
        used.insert(SUMMARY_SHEET.to_lowercase());
        Self { used }
    }

    pub fn unique(&mut self, table: &str) -> String {
        let base = sanitize_sheet_name(table);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }
        let mut n = 2usize;
        loop {
            let suffix = format!("~{n}");
            let keep = MAX_SHEET_NAME_CHARS - suffix.chars().count();
            let candidate = format!("{}{suffix}", base.chars().take(keep).collect::<String>());
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}

impl Default for SheetNamer {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies Excel's sheet naming rules: at most 31 chars, none of `[]:*?/\`,
/// no leading/trailing apostrophe, not empty.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME_CHARS)
        .collect();
    let trimmed = cleaned.trim_matches('\'');
    if trimmed.trim().is_empty() {
        "table".to_string()
    } else {
        trimmed.to_string()
    }
}
