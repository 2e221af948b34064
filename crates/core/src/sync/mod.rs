//! Sync engine helpers: retry classification, backoff, cadence.

mod engine;
mod scheduler;

pub use engine::*;
pub use scheduler::*;
