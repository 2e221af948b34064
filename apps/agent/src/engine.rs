//! Sync engine: drains the mutation queue against the delivery API.
//!
//! At most one drain runs at a time. Triggers arriving while a drain is in
//! flight wait for it and return its outcome instead of starting another,
//! so redundant wake-ups (startup, connectivity regained, background wake)
//! collapse into one pass over the queue.

use chrono::{Duration, Utc};
use log::{debug, error, warn};

use fieldops_core::conflict::{resolve_last_write_wins, snapshots_diverge};
use fieldops_core::queue::{FailureKind, MutationQueueItem};
use fieldops_core::sync::{backoff_seconds, RetryClass, SyncOutcome};
use fieldops_core::Result;
use fieldops_delivery::{DeliveryError, QueuedDelivery};

use crate::context::AgentContext;

/// Run one sync cycle: drain due items in FIFO order, settle each one.
///
/// Returns the cycle outcome. When another cycle is already running, waits
/// for it and returns its stored outcome without touching the queue.
pub async fn run_sync_cycle(ctx: &AgentContext) -> Result<SyncOutcome> {
    let _guard = match ctx.runtime.cycle_mutex.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            debug!("sync cycle already running, joining its outcome");
            drop(ctx.runtime.cycle_mutex.lock().await);
            let joined = ctx.runtime.last_outcome.lock().await.clone();
            return Ok(joined.unwrap_or_else(SyncOutcome::offline));
        }
    };

    let outcome = drain_queue(ctx).await?;
    *ctx.runtime.last_outcome.lock().await = Some(outcome.clone());
    Ok(outcome)
}

async fn drain_queue(ctx: &AgentContext) -> Result<SyncOutcome> {
    if !ctx.connectivity.is_online() {
        debug!("sync skipped: offline");
        return Ok(SyncOutcome::offline());
    }

    // A predecessor that died between mark_processing and settling leaves
    // rows behind that list_due would never surface again.
    let recovered = ctx.queue.recover_interrupted().await?;
    if recovered > 0 {
        warn!("recovered {recovered} mutation(s) interrupted mid-delivery");
    }

    let due = ctx.queue.list_due(ctx.policy.drain_limit)?;
    debug!("sync cycle starting: {} due item(s)", due.len());

    let mut sent = 0;
    let mut failed = 0;
    for item in due {
        ctx.queue.mark_processing(item.id.clone()).await?;
        let delivery = QueuedDelivery {
            idempotency_key: item.idempotency_key.clone(),
            mutation_type: item.mutation_type.clone(),
            entity: item.entity.clone(),
            payload: item.payload.clone(),
        };
        match ctx.delivery.deliver(&delivery).await {
            Ok(receipt) => {
                ctx.queue.mark_processed(item.id.clone()).await?;
                sent += 1;
                if let Some(snapshot) = receipt.server_snapshot {
                    reconcile_snapshot(ctx, &item, snapshot).await;
                }
            }
            Err(err) => {
                failed += 1;
                let stop = settle_failure(ctx, &item, err).await?;
                if stop {
                    // The link is degraded; later items would burn their
                    // retry budgets on the same condition.
                    break;
                }
            }
        }
    }

    debug!("sync cycle finished: sent={sent} failed={failed}");
    Ok(SyncOutcome {
        success: failed == 0,
        timestamp: Some(Utc::now().to_rfc3339()),
        sent,
        failed,
    })
}

/// Record a delivery failure on the item. Returns whether the drain should
/// stop (retryable failures indicate a degraded link).
async fn settle_failure(
    ctx: &AgentContext,
    item: &MutationQueueItem,
    err: DeliveryError,
) -> Result<bool> {
    match err.retry_class() {
        RetryClass::Retryable if item.retry_count >= ctx.policy.max_retries => {
            error!(
                "mutation {} exhausted its retry budget ({} attempts): {err}",
                item.id, ctx.policy.max_retries
            );
            ctx.queue
                .mark_failed(
                    item.id.clone(),
                    format!("retry budget exhausted: {err}"),
                    FailureKind::Permanent,
                    None,
                )
                .await?;
            Ok(true)
        }
        RetryClass::Retryable => {
            let delay = backoff_seconds(item.retry_count);
            let next_retry_at = (Utc::now() + Duration::seconds(delay)).to_rfc3339();
            warn!(
                "mutation {} failed (attempt {}), retrying in {delay}s: {err}",
                item.id,
                item.retry_count + 1
            );
            ctx.queue
                .mark_failed(
                    item.id.clone(),
                    err.to_string(),
                    FailureKind::Temporary,
                    Some(next_retry_at),
                )
                .await?;
            Ok(true)
        }
        RetryClass::Permanent => {
            error!("mutation {} rejected by server: {err}", item.id);
            ctx.queue
                .mark_failed(item.id.clone(), err.to_string(), FailureKind::Permanent, None)
                .await?;
            Ok(false)
        }
    }
}

/// When the server's resulting state differs from what the client sent,
/// the remote snapshot wins and the divergence is logged for audit. A log
/// write failure must not unsettle an already-delivered mutation.
async fn reconcile_snapshot(
    ctx: &AgentContext,
    item: &MutationQueueItem,
    snapshot: serde_json::Value,
) {
    if !snapshots_diverge(&item.payload, &snapshot) {
        return;
    }
    let entity_id = item
        .payload
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| item.id.clone());
    let resolved =
        resolve_last_write_wins(item.entity.clone(), entity_id, item.payload.clone(), snapshot);
    if let Err(err) = ctx.conflict_log.append(resolved.log_item).await {
        warn!("conflict log append failed for mutation {}: {err}", item.id);
    }
}
