//! Background wake machinery.
//!
//! Two layers keep the queue draining without a page open: a best-effort
//! platform wake registration (which may be unsupported or denied) and the
//! agent's own periodic loop while it is alive. Both only ever *trigger*
//! the engine; cadence is advisory, correctness lives in the queue.

use log::{debug, warn};
use std::sync::Arc;

use fieldops_core::queue::{MutationStatus, StatusFilter};
use fieldops_core::sync::{
    SYNC_PENDING_DELAY_MS, SYNC_WAKE_INTERVAL_SECS, SYNC_WAKE_JITTER_SECS,
};

use crate::context::AgentContext;
use crate::engine::run_sync_cycle;

/// Platform hook for waking the agent while it is not running.
pub trait WakeRegistrar: Send + Sync {
    /// Ask the platform to wake the agent with this tag at roughly the
    /// given cadence. Denial or lack of support is an error the *caller*
    /// must absorb.
    fn register_wake(&self, tag: &str, min_interval_secs: u64) -> anyhow::Result<()>;
}

pub const SYNC_WAKE_TAG: &str = "fieldops-sync";

/// Register the periodic platform wake. Degrades silently: an unsupported
/// or denied registration leaves sync relying on lifecycle triggers alone.
pub fn register_periodic_wake(registrar: &dyn WakeRegistrar) {
    match registrar.register_wake(SYNC_WAKE_TAG, SYNC_WAKE_INTERVAL_SECS) {
        Ok(()) => debug!("periodic wake registered as {SYNC_WAKE_TAG}"),
        Err(err) => warn!("periodic wake unavailable, relying on lifecycle triggers: {err}"),
    }
}

/// Start the in-process periodic drain loop, if not already running.
pub async fn ensure_background_loop_started(context: Arc<AgentContext>) {
    let mut guard = context.runtime.background_task.lock().await;
    if let Some(handle) = guard.as_ref() {
        if !handle.is_finished() {
            return;
        }
        guard.take();
    }

    let loop_context = Arc::clone(&context);
    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_millis(next_delay_ms(&loop_context)))
                .await;
            if let Err(err) = run_sync_cycle(&loop_context).await {
                warn!("background sync cycle failed: {err}");
            }
        }
    });
    *guard = Some(handle);
}

pub async fn ensure_background_loop_stopped(context: Arc<AgentContext>) {
    let mut guard = context.runtime.background_task.lock().await;
    if let Some(handle) = guard.take() {
        handle.abort();
    }
}

/// Sleep until the next wake: base cadence plus timestamp-derived jitter,
/// shortened when due work is already queued.
fn next_delay_ms(context: &AgentContext) -> u64 {
    let jitter_bound = SYNC_WAKE_JITTER_SECS.saturating_mul(1000);
    let jitter_ms = if jitter_bound > 0 {
        chrono::Utc::now().timestamp_millis().unsigned_abs() % jitter_bound
    } else {
        0
    };
    let mut delay_ms = SYNC_WAKE_INTERVAL_SECS.saturating_mul(1000) + jitter_ms;

    match context.queue.count(StatusFilter::status(MutationStatus::Pending)) {
        Ok(pending) if pending > 0 => {
            delay_ms = delay_ms.min(SYNC_PENDING_DELAY_MS + (jitter_ms % 500));
        }
        Ok(_) => {}
        Err(err) => warn!("queue depth check failed: {err}"),
    }
    delay_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingRegistrar {
        calls: AtomicUsize,
        deny: bool,
    }

    impl WakeRegistrar for RecordingRegistrar {
        fn register_wake(&self, tag: &str, min_interval_secs: u64) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(tag, SYNC_WAKE_TAG);
            assert_eq!(min_interval_secs, SYNC_WAKE_INTERVAL_SECS);
            if self.deny {
                anyhow::bail!("periodic background sync permission denied")
            }
            Ok(())
        }
    }

    #[test]
    fn registration_denial_is_absorbed() {
        let registrar = RecordingRegistrar {
            calls: AtomicUsize::new(0),
            deny: true,
        };
        register_periodic_wake(&registrar);
        assert_eq!(registrar.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registration_success_is_absorbed_too() {
        let registrar = RecordingRegistrar {
            calls: AtomicUsize::new(0),
            deny: false,
        };
        register_periodic_wake(&registrar);
        assert_eq!(registrar.calls.load(Ordering::SeqCst), 1);
    }
}
