//! Singleton push preference snapshot storage.

use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fieldops_core::push::PushPreferenceSnapshot;
use fieldops_core::Result;

use crate::db::write_actor::WriteHandle;
use crate::db::{get_connection, DbPool};
use crate::errors::StorageError;
use crate::schema::push_preferences;

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Debug, Clone, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::push_preferences)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct PushPreferencesDB {
    id: i32,
    flags: String,
    updated_at: String,
}

pub struct PushPreferenceRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl PushPreferenceRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Overwrite the singleton snapshot wholesale; no history is kept.
    pub async fn save(&self, snapshot: PushPreferenceSnapshot) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = PushPreferencesDB {
                    id: 1,
                    flags: serde_json::to_string(&snapshot)?,
                    updated_at: Utc::now().to_rfc3339(),
                };
                diesel::insert_into(push_preferences::table)
                    .values(&row)
                    .on_conflict(push_preferences::id)
                    .do_update()
                    .set((
                        push_preferences::flags.eq(row.flags.clone()),
                        push_preferences::updated_at.eq(row.updated_at.clone()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Synchronous read used on push receipt; `None` until the foreground
    /// has pushed a snapshot at least once.
    pub fn load(&self) -> Result<Option<PushPreferenceSnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        let row = push_preferences::table
            .find(1)
            .first::<PushPreferencesDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(|r| Ok(serde_json::from_str(&r.flags)?)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::db::write_actor::spawn_writer;
    use crate::db::{create_pool, init, run_migrations};

    fn setup_repo() -> PushPreferenceRepository {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        PushPreferenceRepository::new(pool, writer)
    }

    #[tokio::test]
    async fn save_overwrites_the_singleton_wholesale() {
        let repo = setup_repo();
        assert_eq!(repo.load().expect("load"), None);

        let first = PushPreferenceSnapshot::default()
            .set("notify_status_change", true)
            .set("notify_new_message", false);
        repo.save(first.clone()).await.expect("save");
        assert_eq!(repo.load().expect("load"), Some(first));

        // A later snapshot replaces everything, including keys it omits.
        let second = PushPreferenceSnapshot::default().set("notify_status_change", false);
        repo.save(second.clone()).await.expect("save");
        assert_eq!(repo.load().expect("load"), Some(second));
    }
}
