//! Domain models and pure logic for the FieldOps offline sync layer.

pub mod conflict;
pub mod errors;
pub mod push;
pub mod queue;
pub mod sync;

pub use errors::{CoreError, Result};
