//! Repository for the durable mutation queue.
//!
//! Every mutating operation runs as one transaction on the writer task, so
//! the in-flight idempotency-key check and the status transition guards are
//! atomic under concurrent foreground pages.

use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;
use uuid::Uuid;

use fieldops_core::queue::{
    FailureKind, MutationQueueItem, MutationStatus, NewMutation, StatusFilter,
};
use fieldops_core::{CoreError, Result};

use crate::db::write_actor::WriteHandle;
use crate::db::{get_connection, DbPool};
use crate::errors::StorageError;
use crate::schema::mutation_queue;

use super::model::MutationQueueItemDB;

pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

fn load_item(conn: &mut SqliteConnection, item_id: &str) -> Result<MutationQueueItemDB> {
    mutation_queue::table
        .find(item_id)
        .first::<MutationQueueItemDB>(conn)
        .optional()
        .map_err(StorageError::from)?
        .ok_or_else(|| CoreError::not_found(item_id))
}

pub struct MutationQueueRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl MutationQueueRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Persist a new mutation as `pending` and return it.
    ///
    /// Exactly one record per idempotency key may be active (non-processed)
    /// at a time; a second enqueue while one is in flight fails with
    /// `DuplicateInFlight` and must be treated by callers as "already queued".
    pub async fn enqueue(&self, new_mutation: NewMutation) -> Result<MutationQueueItem> {
        self.writer
            .exec(move |conn| {
                let processed = enum_to_db(&MutationStatus::Processed)?;
                let in_flight: i64 = mutation_queue::table
                    .filter(mutation_queue::idempotency_key.eq(&new_mutation.idempotency_key))
                    .filter(mutation_queue::status.ne(processed))
                    .count()
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                if in_flight > 0 {
                    return Err(CoreError::duplicate(new_mutation.idempotency_key));
                }

                let now = Utc::now().to_rfc3339();
                let item = MutationQueueItem {
                    id: Uuid::now_v7().to_string(),
                    idempotency_key: new_mutation.idempotency_key,
                    mutation_type: new_mutation.mutation_type,
                    entity: new_mutation.entity,
                    payload: new_mutation.payload,
                    status: MutationStatus::Pending,
                    failure_kind: None,
                    retry_count: 0,
                    last_error: None,
                    next_retry_at: None,
                    created_at: now.clone(),
                    updated_at: now,
                };
                diesel::insert_into(mutation_queue::table)
                    .values(MutationQueueItemDB::from_domain(&item)?)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(item)
            })
            .await
    }

    /// Read-only projection for UI, FIFO by creation time.
    pub fn list(&self, filter: StatusFilter) -> Result<Vec<MutationQueueItem>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = mutation_queue::table.into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(mutation_queue::status.eq(enum_to_db(&status)?));
        }
        if let Some(kind) = filter.failure_kind {
            query = query.filter(mutation_queue::failure_kind.eq(enum_to_db(&kind)?));
        }
        let rows = query
            .order((mutation_queue::created_at.asc(), mutation_queue::id.asc()))
            .load::<MutationQueueItemDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(MutationQueueItemDB::into_domain).collect()
    }

    pub fn count(&self, filter: StatusFilter) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = mutation_queue::table.into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(mutation_queue::status.eq(enum_to_db(&status)?));
        }
        if let Some(kind) = filter.failure_kind {
            query = query.filter(mutation_queue::failure_kind.eq(enum_to_db(&kind)?));
        }
        Ok(query
            .count()
            .get_result(&mut conn)
            .map_err(StorageError::from)?)
    }

    /// Items eligible for the next drain: `pending`, plus `failed(temporary)`
    /// whose retry delay has elapsed. FIFO by creation time.
    pub fn list_due(&self, limit: i64) -> Result<Vec<MutationQueueItem>> {
        let mut conn = get_connection(&self.pool)?;
        let now = Utc::now().to_rfc3339();
        let pending = enum_to_db(&MutationStatus::Pending)?;
        let failed = enum_to_db(&MutationStatus::Failed)?;
        let temporary = enum_to_db(&FailureKind::Temporary)?;

        let rows = mutation_queue::table
            .filter(
                mutation_queue::status.eq(pending).or(mutation_queue::status
                    .eq(failed)
                    .and(mutation_queue::failure_kind.eq(temporary))
                    .and(
                        mutation_queue::next_retry_at
                            .is_null()
                            .or(mutation_queue::next_retry_at.le(now)),
                    )),
            )
            .order((mutation_queue::created_at.asc(), mutation_queue::id.asc()))
            .limit(limit)
            .load::<MutationQueueItemDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(MutationQueueItemDB::into_domain).collect()
    }

    /// `pending -> processing`, or a requeued `failed(temporary) -> pending
    /// -> processing` in one step during a drain.
    pub async fn mark_processing(&self, item_id: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = load_item(conn, &item_id)?;
                let status: MutationStatus = enum_from_db(&row.status)?;
                let kind = row.failure_kind.as_deref().map(enum_from_db).transpose()?;
                // A due failed(temporary) item passes through pending
                // implicitly when the drain picks it up.
                if status == MutationStatus::Failed {
                    status.transition(MutationStatus::Pending, kind)?;
                } else {
                    status.transition(MutationStatus::Processing, kind)?;
                }
                diesel::update(mutation_queue::table.find(&item_id))
                    .set((
                        mutation_queue::status.eq(enum_to_db(&MutationStatus::Processing)?),
                        mutation_queue::updated_at.eq(Utc::now().to_rfc3339()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// `processing -> processed`; delivery acknowledged by the server.
    pub async fn mark_processed(&self, item_id: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = load_item(conn, &item_id)?;
                let status: MutationStatus = enum_from_db(&row.status)?;
                status.transition(MutationStatus::Processed, None)?;
                diesel::update(mutation_queue::table.find(&item_id))
                    .set((
                        mutation_queue::status.eq(enum_to_db(&MutationStatus::Processed)?),
                        mutation_queue::failure_kind.eq::<Option<String>>(None),
                        mutation_queue::next_retry_at.eq::<Option<String>>(None),
                        mutation_queue::last_error.eq::<Option<String>>(None),
                        mutation_queue::updated_at.eq(Utc::now().to_rfc3339()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// `processing -> failed`. Temporary failures increment the retry count
    /// and carry the next retry time; permanent failures keep the count as
    /// diagnostics and wait for an operator.
    pub async fn mark_failed(
        &self,
        item_id: String,
        error_message: String,
        kind: FailureKind,
        next_retry_at: Option<String>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = load_item(conn, &item_id)?;
                let status: MutationStatus = enum_from_db(&row.status)?;
                status.transition(MutationStatus::Failed, Some(kind))?;
                let retry_count = match kind {
                    FailureKind::Temporary => row.retry_count + 1,
                    FailureKind::Permanent => row.retry_count,
                };
                diesel::update(mutation_queue::table.find(&item_id))
                    .set((
                        mutation_queue::status.eq(enum_to_db(&MutationStatus::Failed)?),
                        mutation_queue::failure_kind.eq(Some(enum_to_db(&kind)?)),
                        mutation_queue::retry_count.eq(retry_count),
                        mutation_queue::last_error.eq(Some(error_message)),
                        mutation_queue::next_retry_at.eq(next_retry_at),
                        mutation_queue::updated_at.eq(Utc::now().to_rfc3339()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Reset a failed item to `pending`. Manual (operator) requeue clears the
    /// retry count and is allowed for permanent failures; automatic requeue
    /// preserves the count and only applies to temporary ones.
    pub async fn requeue(&self, item_id: String, manual: bool) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = load_item(conn, &item_id)?;
                let status: MutationStatus = enum_from_db(&row.status)?;
                let kind = row.failure_kind.as_deref().map(enum_from_db).transpose()?;
                if manual {
                    if status != MutationStatus::Failed {
                        return Err(CoreError::InvalidTransition {
                            from: status,
                            to: MutationStatus::Pending,
                        });
                    }
                } else {
                    status.transition(MutationStatus::Pending, kind)?;
                }
                let retry_count = if manual { 0 } else { row.retry_count };
                diesel::update(mutation_queue::table.find(&item_id))
                    .set((
                        mutation_queue::status.eq(enum_to_db(&MutationStatus::Pending)?),
                        mutation_queue::failure_kind.eq::<Option<String>>(None),
                        mutation_queue::retry_count.eq(retry_count),
                        mutation_queue::next_retry_at.eq::<Option<String>>(None),
                        mutation_queue::updated_at.eq(Utc::now().to_rfc3339()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Reset rows left `processing` by an interrupted drain back to
    /// `pending`, returning how many were recovered.
    ///
    /// Only the drain sets `processing`, and it settles every item before
    /// releasing the cycle lock, so any row seen here belongs to a process
    /// that died mid-delivery. Redelivery is safe: the server deduplicates
    /// on the idempotency key.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let processing = enum_to_db(&MutationStatus::Processing)?;
                let recovered = diesel::update(
                    mutation_queue::table.filter(mutation_queue::status.eq(processing)),
                )
                .set((
                    mutation_queue::status.eq(enum_to_db(&MutationStatus::Pending)?),
                    mutation_queue::updated_at.eq(Utc::now().to_rfc3339()),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(recovered)
            })
            .await
    }

    /// Permanent discard; only legal once an item has settled.
    pub async fn remove(&self, item_id: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = load_item(conn, &item_id)?;
                let status: MutationStatus = enum_from_db(&row.status)?;
                if !status.is_removable() {
                    return Err(CoreError::RemovalNotAllowed { status });
                }
                diesel::delete(mutation_queue::table.find(&item_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
