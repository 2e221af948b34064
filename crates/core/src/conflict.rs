//! Last-write-wins conflict resolution.
//!
//! When a replay is accepted but the server's resulting state differs from
//! what the client assumed, the remote snapshot becomes the new local truth
//! and both snapshots are appended to an audit log. The log is never read
//! back for replay.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The only supported resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    LastWriteWins,
}

/// Append-only audit record of one resolved conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictLogItem {
    pub id: String,
    pub entity: String,
    pub entity_id: String,
    pub local_snapshot: serde_json::Value,
    pub remote_snapshot: serde_json::Value,
    pub resolution: ConflictResolution,
    pub created_at: String,
}

/// Outcome of resolving one divergence: the snapshot to keep locally plus
/// the audit record to append.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConflict {
    pub winner: serde_json::Value,
    pub log_item: ConflictLogItem,
}

/// Resolve a local/remote divergence: the remote snapshot always wins.
pub fn resolve_last_write_wins(
    entity: impl Into<String>,
    entity_id: impl Into<String>,
    local_snapshot: serde_json::Value,
    remote_snapshot: serde_json::Value,
) -> ResolvedConflict {
    let log_item = ConflictLogItem {
        id: Uuid::now_v7().to_string(),
        entity: entity.into(),
        entity_id: entity_id.into(),
        local_snapshot,
        remote_snapshot: remote_snapshot.clone(),
        resolution: ConflictResolution::LastWriteWins,
        created_at: Utc::now().to_rfc3339(),
    };
    ResolvedConflict {
        winner: remote_snapshot,
        log_item,
    }
}

/// Whether a delivery receipt's snapshot diverges from the local one.
pub fn snapshots_diverge(local: &serde_json::Value, remote: &serde_json::Value) -> bool {
    local != remote
}
