//! Storage-level error types.

use fieldops_core::CoreError;
use thiserror::Error;

/// Errors raised below the repository boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("query failed: {0}")]
    Diesel(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("database unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        CoreError::Database(err.to_string())
    }
}
