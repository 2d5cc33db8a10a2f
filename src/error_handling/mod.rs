//! Error handling for snapshot operations.
//!
//! This module provides:
//! - The fatal error type [`SnapshotError`] and its stable [`ErrorKind`]
//! - The non-fatal [`PartialExportWarning`] reported by spreadsheet exports
//! - Initialization errors for the binary
//!
//! Fatal errors abort the current operation with no partial artifact left on
//! disk. Warnings are recovered locally and returned next to the result.

mod types;

// Re-export public API
pub use types::{ErrorKind, InitializationError, PartialExportWarning, SnapshotError};
