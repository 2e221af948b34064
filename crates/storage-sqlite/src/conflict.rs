//! Append-only conflict audit log.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fieldops_core::conflict::ConflictLogItem;
use fieldops_core::Result;

use crate::db::write_actor::WriteHandle;
use crate::db::{get_connection, DbPool};
use crate::errors::StorageError;
use crate::queue::{enum_from_db, enum_to_db};
use crate::schema::conflict_log;

#[derive(Queryable, Identifiable, Insertable, Selectable, Debug, Clone, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::conflict_log)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConflictLogItemDB {
    pub id: String,
    pub entity: String,
    pub entity_id: String,
    pub local_snapshot: String,
    pub remote_snapshot: String,
    pub resolution: String,
    pub created_at: String,
}

impl ConflictLogItemDB {
    fn into_domain(self) -> Result<ConflictLogItem> {
        Ok(ConflictLogItem {
            id: self.id,
            entity: self.entity,
            entity_id: self.entity_id,
            local_snapshot: serde_json::from_str(&self.local_snapshot)?,
            remote_snapshot: serde_json::from_str(&self.remote_snapshot)?,
            resolution: enum_from_db(&self.resolution)?,
            created_at: self.created_at,
        })
    }

    fn from_domain(item: &ConflictLogItem) -> Result<Self> {
        Ok(Self {
            id: item.id.clone(),
            entity: item.entity.clone(),
            entity_id: item.entity_id.clone(),
            local_snapshot: serde_json::to_string(&item.local_snapshot)?,
            remote_snapshot: serde_json::to_string(&item.remote_snapshot)?,
            resolution: enum_to_db(&item.resolution)?,
            created_at: item.created_at.clone(),
        })
    }
}

pub struct ConflictLogRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl ConflictLogRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Append one resolved conflict. Records are never mutated afterwards.
    pub async fn append(&self, item: ConflictLogItem) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::insert_into(conflict_log::table)
                    .values(ConflictLogItemDB::from_domain(&item)?)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Audit projection, oldest first.
    pub fn list(&self) -> Result<Vec<ConflictLogItem>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = conflict_log::table
            .order(conflict_log::created_at.asc())
            .load::<ConflictLogItemDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(ConflictLogItemDB::into_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_core::conflict::resolve_last_write_wins;
    use serde_json::json;
    use tempfile::tempdir;

    use crate::db::write_actor::spawn_writer;
    use crate::db::{create_pool, init, run_migrations};

    fn setup_repo() -> ConflictLogRepository {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        ConflictLogRepository::new(pool, writer)
    }

    #[tokio::test]
    async fn appended_conflicts_round_trip() {
        let repo = setup_repo();
        let resolved = resolve_last_write_wins(
            "quote",
            "q-7",
            json!({ "total": 100 }),
            json!({ "total": 140 }),
        );
        repo.append(resolved.log_item.clone()).await.expect("append");

        let logged = repo.list().expect("list");
        assert_eq!(logged, vec![resolved.log_item]);
    }
}
