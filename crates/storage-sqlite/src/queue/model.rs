//! Database row model for the mutation queue.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use fieldops_core::queue::MutationQueueItem;
use fieldops_core::Result;

use super::repository::{enum_from_db, enum_to_db};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::mutation_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MutationQueueItemDB {
    pub id: String,
    pub idempotency_key: String,
    pub mutation_type: String,
    pub entity: String,
    pub payload: String,
    pub status: String,
    pub failure_kind: Option<String>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl MutationQueueItemDB {
    pub fn into_domain(self) -> Result<MutationQueueItem> {
        Ok(MutationQueueItem {
            id: self.id,
            idempotency_key: self.idempotency_key,
            mutation_type: self.mutation_type,
            entity: self.entity,
            payload: serde_json::from_str(&self.payload)?,
            status: enum_from_db(&self.status)?,
            failure_kind: self
                .failure_kind
                .as_deref()
                .map(enum_from_db)
                .transpose()?,
            retry_count: self.retry_count,
            last_error: self.last_error,
            next_retry_at: self.next_retry_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    pub fn from_domain(item: &MutationQueueItem) -> Result<Self> {
        Ok(Self {
            id: item.id.clone(),
            idempotency_key: item.idempotency_key.clone(),
            mutation_type: item.mutation_type.clone(),
            entity: item.entity.clone(),
            payload: serde_json::to_string(&item.payload)?,
            status: enum_to_db(&item.status)?,
            failure_kind: item.failure_kind.as_ref().map(enum_to_db).transpose()?,
            retry_count: item.retry_count,
            last_error: item.last_error.clone(),
            next_retry_at: item.next_retry_at.clone(),
            created_at: item.created_at.clone(),
            updated_at: item.updated_at.clone(),
        })
    }
}
