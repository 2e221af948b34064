//! Mutation queue item model.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

/// Classification attached to a failed item.
///
/// Temporary failures are retried automatically with backoff; permanent
/// failures wait for an operator decision (requeue or discard).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Temporary,
    Permanent,
}

/// One unit of deferred work, persisted before any network delivery is
/// attempted. `mutation_type`, `entity` and `payload` are opaque to this
/// subsystem and replayed verbatim against the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationQueueItem {
    pub id: String,
    pub idempotency_key: String,
    pub mutation_type: String,
    pub entity: String,
    pub payload: serde_json::Value,
    pub status: MutationStatus,
    pub failure_kind: Option<FailureKind>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Enqueue request as produced by a UI action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMutation {
    pub idempotency_key: String,
    pub mutation_type: String,
    pub entity: String,
    pub payload: serde_json::Value,
}

impl NewMutation {
    pub fn new(
        idempotency_key: impl Into<String>,
        mutation_type: impl Into<String>,
        entity: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            mutation_type: mutation_type.into(),
            entity: entity.into(),
            payload,
        }
    }
}

/// Read-only projection filter for `list`/`count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFilter {
    pub status: Option<MutationStatus>,
    pub failure_kind: Option<FailureKind>,
}

impl StatusFilter {
    pub fn status(status: MutationStatus) -> Self {
        Self {
            status: Some(status),
            failure_kind: None,
        }
    }

    pub fn failed(kind: FailureKind) -> Self {
        Self {
            status: Some(MutationStatus::Failed),
            failure_kind: Some(kind),
        }
    }
}
