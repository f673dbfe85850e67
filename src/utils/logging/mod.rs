//! Logging utilities for operation output and progress tracking

pub mod log;
pub mod progress;

pub use log::{log_cache_fallback, log_operation_complete, log_operation_start};
pub use progress::{create_main_progress_bar, create_spinner, finish_progress_bar};
