//! Agent service context: explicit injected handles instead of ambient
//! globals, so each execution context can be constructed and torn down in
//! tests.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use fieldops_core::sync::{SyncOutcome, SYNC_MAX_RETRIES};
use fieldops_delivery::DeliveryApi;
use fieldops_storage_sqlite::{
    ConflictLogRepository, MutationQueueRepository, PushPreferenceRepository,
};

use crate::bus::AgentBus;
use crate::net::ConnectivityProbe;

/// Mutable runtime state for the sync engine.
#[derive(Default)]
pub struct SyncRuntimeState {
    /// Serializes drains; a second trigger joins the in-flight result.
    pub cycle_mutex: Mutex<()>,
    /// Outcome of the most recent completed cycle.
    pub last_outcome: Mutex<Option<SyncOutcome>>,
    pub background_task: Mutex<Option<JoinHandle<()>>>,
}

/// Retry policy knobs for the sync engine.
#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    /// Temporary failures beyond this budget are reclassified as permanent.
    pub max_retries: i32,
    /// Per-drain batch bound.
    pub drain_limit: i64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            max_retries: SYNC_MAX_RETRIES,
            drain_limit: 500,
        }
    }
}

pub struct AgentContext {
    pub queue: Arc<MutationQueueRepository>,
    pub conflict_log: Arc<ConflictLogRepository>,
    pub preferences: Arc<PushPreferenceRepository>,
    pub delivery: Arc<dyn DeliveryApi>,
    pub connectivity: Arc<dyn ConnectivityProbe>,
    pub policy: SyncPolicy,
    pub runtime: Arc<SyncRuntimeState>,
    pub bus: AgentBus,
}
