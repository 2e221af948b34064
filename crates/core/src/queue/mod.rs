//! Mutation queue domain model and lifecycle rules.

mod lifecycle;
mod model;

pub use lifecycle::*;
pub use model::*;
