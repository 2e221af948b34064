//! Request-intercepting cache layer for the background execution context.
//!
//! Read requests are classified by structural signals into one of four
//! policies; mutating requests are never intercepted here (queuing those is
//! the mutation queue's job, never the cache's).

mod partition;
mod router;

pub use partition::{CachePartition, CacheRegistry, CachedResponse};
pub use router::{
    CacheConfig, CacheError, CacheRequest, CacheRouter, Fetch, ResourceClass, ResourceKind,
    RouterOutcome,
};
