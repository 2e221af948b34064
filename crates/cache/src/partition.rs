//! Named, versioned, bounded cache partitions.

use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A cached response body with just enough metadata to be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn ok(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

struct PartitionInner {
    entries: HashMap<String, Arc<CachedResponse>>,
    order: VecDeque<String>,
}

/// One mutually-exclusive cache partition: `(request-key -> response)` with
/// insertion-order eviction at `max_entries`. Eviction on insert is the only
/// mutation path and runs atomically under the partition lock.
pub struct CachePartition {
    name: String,
    max_entries: usize,
    inner: Mutex<PartitionInner>,
}

impl CachePartition {
    /// `name` is suffixed with the cache version so activation of a new
    /// background-context version can drop every stale partition by name.
    pub fn new(name: &str, version: &str, max_entries: usize) -> Self {
        Self {
            name: format!("{name}-{version}"),
            max_entries: max_entries.max(1),
            inner: Mutex::new(PartitionInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &str) -> Option<Arc<CachedResponse>> {
        self.inner.lock().await.entries.get(key).cloned()
    }

    /// Insert a response; when the partition is full the oldest-inserted
    /// entry is evicted in the same critical section. Re-inserting an
    /// existing key refreshes the value without consuming capacity.
    pub async fn insert(&self, key: impl Into<String>, response: CachedResponse) {
        let key = key.into();
        let mut inner = self.inner.lock().await;
        if inner.entries.contains_key(&key) {
            inner.entries.insert(key, Arc::new(response));
            return;
        }
        if inner.order.len() == self.max_entries {
            if let Some(oldest) = inner.order.pop_front() {
                debug!("cache partition {} evicting '{}'", self.name, oldest);
                inner.entries.remove(&oldest);
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, Arc::new(response));
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// All partitions owned by one background-context version.
pub struct CacheRegistry {
    partitions: Mutex<HashMap<String, Arc<CachePartition>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            partitions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, partition: Arc<CachePartition>) {
        self.partitions
            .lock()
            .await
            .insert(partition.name().to_string(), partition);
    }

    /// Drop every partition whose versioned name is not in `current`; no
    /// stale-version entries survive an activation.
    pub async fn activate(&self, current: &[String]) -> Vec<String> {
        let mut partitions = self.partitions.lock().await;
        let stale: Vec<String> = partitions
            .keys()
            .filter(|name| !current.contains(name))
            .cloned()
            .collect();
        for name in &stale {
            debug!("dropping stale cache partition '{name}'");
            partitions.remove(name);
        }
        stale
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.lock().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
