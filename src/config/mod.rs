//! Engine configuration and constants.
//!
//! This module provides:
//! - Default values for every tunable
//! - The library-level [`EngineConfig`]
//! - CLI option types and parsing

mod cli;
mod constants;
mod types;

// Re-export all constants
pub use cli::{Cli, Command, CreateArgs, OutputFormat};
pub use constants::*;
pub use types::{EngineConfig, LogFormat, LogLevel};
