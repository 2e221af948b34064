//! Error types shared across the sync workspace.

use thiserror::Error;

use crate::queue::MutationStatus;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the mutation queue and its lifecycle manager.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An active (non-processed) record with the same idempotency key already
    /// exists. Callers should treat this as "already queued".
    #[error("mutation with idempotency key '{idempotency_key}' is already in flight")]
    DuplicateInFlight { idempotency_key: String },

    /// Illegal status transition. This is a programming error and must never
    /// surface to a user.
    #[error("invalid queue transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: MutationStatus,
        to: MutationStatus,
    },

    /// No queue item with the given id.
    #[error("queue item '{id}' not found")]
    NotFound { id: String },

    /// Remove is only legal on failed or processed items.
    #[error("queue item cannot be removed while {status:?}")]
    RemovalNotAllowed { status: MutationStatus },

    /// Storage-layer failure surfaced through the repository boundary.
    #[error("database error: {0}")]
    Database(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a duplicate-in-flight error for the given key.
    pub fn duplicate(idempotency_key: impl Into<String>) -> Self {
        Self::DuplicateInFlight {
            idempotency_key: idempotency_key.into(),
        }
    }

    /// Create a not-found error for the given id.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a database error from any displayable source.
    pub fn database(message: impl std::fmt::Display) -> Self {
        Self::Database(message.to_string())
    }
}
