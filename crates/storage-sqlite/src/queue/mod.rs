//! SQLite persistence for the durable mutation queue.

mod model;
mod repository;

pub use model::MutationQueueItemDB;
pub use repository::MutationQueueRepository;

pub(crate) use repository::{enum_from_db, enum_to_db};
