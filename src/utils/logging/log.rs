//! Standardized operation logging.

use std::path::Path;
use std::time::Duration;

/// Log the start of a file operation
pub fn log_operation_start(operation: &str, path: &Path) {
    log::info!("{} {}", operation, path.display());
}

/// Log a finished file operation
///
/// # Arguments
/// * `operation` - Past-tense verb for what happened ("read", "wrote", "loaded")
/// * `path` - File that was operated on
/// * `rows` - Number of rows or records processed
/// * `elapsed` - Time taken
pub fn log_operation_complete(operation: &str, path: &Path, rows: usize, elapsed: Duration) {
    log::info!(
        "Successfully {operation} {rows} rows ({}) in {elapsed:?}",
        path.display()
    );
}

/// Log that the join cache is not used and the live join runs instead
pub fn log_cache_fallback(reason: &str) {
    log::warn!("{reason}; falling back to the live join");
}
