//! SQLite persistence for the FieldOps offline sync layer.
//!
//! All mutating access goes through a single writer task so concurrent
//! callers (several foreground pages plus the agent) always observe atomic
//! read-modify-write transactions.

pub mod conflict;
pub mod db;
pub mod errors;
pub mod push;
pub mod queue;
pub mod schema;

pub use conflict::ConflictLogRepository;
pub use db::{create_pool, get_connection, init, run_migrations, DbPool};
pub use db::write_actor::{spawn_writer, WriteHandle};
pub use errors::StorageError;
pub use push::PushPreferenceRepository;
pub use queue::MutationQueueRepository;
