//! Process-wide initialization for the CLI binary.

mod logger;

// Re-export public API
pub use logger::init_logger_with;
