//! HTTP delivery of queued mutations to the FieldOps backend.

mod client;
mod error;

pub use client::{DeliveryApi, DeliveryReceipt, HttpDeliveryClient, QueuedDelivery};
pub use error::{DeliveryError, Result};
