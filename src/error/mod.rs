//! Error handling for the labeling core.
//!
//! Every failure is recoverable at the interaction boundary: an error aborts
//! the current action and leaves previously persisted state untouched.

pub mod util;

use std::io;
use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

use crate::auth::CredentialError;
use crate::filter::IndexSpace;
use crate::labels::ValidationError;

/// Crate-wide error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configured source is missing or malformed. No partial dataset is exposed.
    #[error("Failed to load {}: {reason}", path.display())]
    SourceUnreadable { path: PathBuf, reason: String },

    /// A source is readable but lacks a column the join depends on
    #[error("Column '{column}' not found in {}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    /// The join cache cannot be used; callers fall back to the live join
    #[error("Join cache unusable at {}: {reason}", path.display())]
    CacheUnusable { path: PathBuf, reason: String },

    /// Requested record index is beyond the current filtered set
    #[error("Index {index} out of range for {len} records")]
    IndexOutOfRange { index: usize, len: usize },

    /// Label rejected before persistence
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Login or account administration failure
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A position or label refers to an index space that is no longer active
    #[error("Index space changed from {expected} to {actual}")]
    StaleIndexSpace {
        expected: IndexSpace,
        actual: IndexSpace,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Error converting between typed records and Arrow batches
    #[error("Conversion error: {0}")]
    Conversion(#[from] serde_arrow::Error),
}

impl Error {
    /// Build a `SourceUnreadable` error from any displayable cause
    pub fn source_unreadable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::SourceUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a `CacheUnusable` error from any displayable cause
    pub fn cache_unusable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::CacheUnusable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for labeling core operations
pub type Result<T> = std::result::Result<T, Error>;
