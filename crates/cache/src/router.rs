//! Request classification and the four caching policies.

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::partition::{CachePartition, CacheRegistry, CachedResponse};

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Network failure with no cached fallback available.
    #[error("network unavailable: {0}")]
    Network(String),
}

/// Structural resource type declared by the requester, never guessed from
/// the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Script,
    Style,
    Font,
    Image,
    Api,
}

/// An outbound request as seen by the interception layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    pub method: String,
    pub kind: ResourceKind,
    pub url: String,
    pub carries_auth: bool,
}

impl CacheRequest {
    pub fn get(kind: ResourceKind, url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            kind,
            url: url.into(),
            carries_auth: false,
        }
    }

    pub fn with_auth(mut self) -> Self {
        self.carries_auth = true;
        self
    }

    fn is_read(&self) -> bool {
        matches!(self.method.as_str(), "GET" | "HEAD")
    }
}

/// Exactly one class per request; the class fixes the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    Navigation,
    StaticAsset,
    Image,
    ReadApi,
    Mutation,
}

impl ResourceClass {
    pub fn of(request: &CacheRequest) -> Self {
        if !request.is_read() {
            return ResourceClass::Mutation;
        }
        match request.kind {
            ResourceKind::Document => ResourceClass::Navigation,
            ResourceKind::Script | ResourceKind::Style | ResourceKind::Font => {
                ResourceClass::StaticAsset
            }
            ResourceKind::Image => ResourceClass::Image,
            ResourceKind::Api => ResourceClass::ReadApi,
        }
    }
}

/// Network seam so tests can script responses.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse>;
}

/// What the interception layer hands back to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterOutcome {
    /// Mutating request: goes to the network directly or fails outright.
    PassThrough,
    Response(CachedResponse),
}

/// Partition bounds and the cache version.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub version: String,
    pub static_max_entries: usize,
    pub image_max_entries: usize,
    pub api_max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            static_max_entries: 64,
            image_max_entries: 64,
            api_max_entries: 32,
        }
    }
}

/// Routes every intercepted request through the policy for its class.
pub struct CacheRouter {
    fetcher: Arc<dyn Fetch>,
    registry: Arc<CacheRegistry>,
    navigation: Arc<CachePartition>,
    static_assets: Arc<CachePartition>,
    images: Arc<CachePartition>,
    api: Arc<CachePartition>,
}

impl CacheRouter {
    pub async fn new(fetcher: Arc<dyn Fetch>, config: CacheConfig) -> Self {
        let navigation = Arc::new(CachePartition::new("navigation", &config.version, 1));
        let static_assets = Arc::new(CachePartition::new(
            "static",
            &config.version,
            config.static_max_entries,
        ));
        let images = Arc::new(CachePartition::new(
            "images",
            &config.version,
            config.image_max_entries,
        ));
        let api = Arc::new(CachePartition::new(
            "api",
            &config.version,
            config.api_max_entries,
        ));

        let registry = Arc::new(CacheRegistry::new());
        for partition in [&navigation, &static_assets, &images, &api] {
            registry.register(Arc::clone(partition)).await;
        }

        Self {
            fetcher,
            registry,
            navigation,
            static_assets,
            images,
            api,
        }
    }

    /// Versioned names of the partitions this router owns.
    pub fn current_partition_names(&self) -> Vec<String> {
        vec![
            self.navigation.name().to_string(),
            self.static_assets.name().to_string(),
            self.images.name().to_string(),
            self.api.name().to_string(),
        ]
    }

    /// Drop partitions from older cache versions. Returns the dropped names.
    pub async fn activate(&self) -> Vec<String> {
        self.registry.activate(&self.current_partition_names()).await
    }

    pub fn registry(&self) -> Arc<CacheRegistry> {
        Arc::clone(&self.registry)
    }

    pub async fn handle(&self, request: CacheRequest) -> Result<RouterOutcome> {
        match ResourceClass::of(&request) {
            ResourceClass::Mutation => Ok(RouterOutcome::PassThrough),
            ResourceClass::Navigation => self
                .network_first(&request, &self.navigation, false)
                .await
                .map(RouterOutcome::Response),
            ResourceClass::StaticAsset => self
                .stale_while_revalidate(&request, &self.static_assets)
                .await
                .map(RouterOutcome::Response),
            ResourceClass::Image => self
                .cache_first(&request, &self.images)
                .await
                .map(RouterOutcome::Response),
            ResourceClass::ReadApi => self
                .network_first(&request, &self.api, true)
                .await
                .map(RouterOutcome::Response),
        }
    }

    /// Network first, cached fallback on failure. For the read API a missing
    /// fallback yields a synthetic gateway-unavailable response instead of
    /// an error; stale authorization decisions are avoided by keeping
    /// auth-carrying requests out of the cache entirely.
    async fn network_first(
        &self,
        request: &CacheRequest,
        partition: &CachePartition,
        synthetic_fallback: bool,
    ) -> Result<CachedResponse> {
        if request.carries_auth {
            return self.fetcher.fetch(request).await;
        }
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                partition.insert(request.url.clone(), response.clone()).await;
                Ok(response)
            }
            Err(err) => {
                if let Some(cached) = partition.get(&request.url).await {
                    debug!("serving cached fallback for {}", request.url);
                    return Ok((*cached).clone());
                }
                if synthetic_fallback {
                    warn!("no cached fallback for {}: {err}", request.url);
                    return Ok(gateway_unavailable());
                }
                Err(err)
            }
        }
    }

    /// Serve the cached copy immediately and refresh it in the background;
    /// fall through to the network only on a cold cache.
    async fn stale_while_revalidate(
        &self,
        request: &CacheRequest,
        partition: &Arc<CachePartition>,
    ) -> Result<CachedResponse> {
        if request.carries_auth {
            return self.fetcher.fetch(request).await;
        }
        if let Some(cached) = partition.get(&request.url).await {
            let fetcher = Arc::clone(&self.fetcher);
            let partition = Arc::clone(partition);
            let request = request.clone();
            tokio::spawn(async move {
                match fetcher.fetch(&request).await {
                    Ok(fresh) => partition.insert(request.url.clone(), fresh).await,
                    Err(err) => debug!("background revalidation of {} failed: {err}", request.url),
                }
            });
            return Ok((*cached).clone());
        }
        let response = self.fetcher.fetch(request).await?;
        partition.insert(request.url.clone(), response.clone()).await;
        Ok(response)
    }

    /// Cached if present, otherwise fetch and cache.
    async fn cache_first(
        &self,
        request: &CacheRequest,
        partition: &CachePartition,
    ) -> Result<CachedResponse> {
        if request.carries_auth {
            return self.fetcher.fetch(request).await;
        }
        if let Some(cached) = partition.get(&request.url).await {
            return Ok((*cached).clone());
        }
        let response = self.fetcher.fetch(request).await?;
        partition.insert(request.url.clone(), response.clone()).await;
        Ok(response)
    }
}

/// Synthetic response when the read API is unreachable and nothing is cached.
fn gateway_unavailable() -> CachedResponse {
    CachedResponse {
        status: 503,
        content_type: "application/json".to_string(),
        body: b"{\"error\":\"gateway unavailable\"}".to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Scripted fetcher: per-URL queue of responses, then failures.
    struct ScriptedFetch {
        responses: Mutex<HashMap<String, Vec<CachedResponse>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetch {
        fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }

        async fn script(&self, url: &str, response: CachedResponse) {
            self.responses
                .lock()
                .await
                .entry(url.to_string())
                .or_default()
                .push(response);
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetch for ScriptedFetch {
        async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().await;
            match responses.get_mut(&request.url) {
                Some(queue) if !queue.is_empty() => Ok(queue.remove(0)),
                _ => Err(CacheError::Network("connection refused".to_string())),
            }
        }
    }

    async fn router_with(fetcher: Arc<ScriptedFetch>) -> CacheRouter {
        CacheRouter::new(
            fetcher,
            CacheConfig {
                version: "v3".to_string(),
                static_max_entries: 4,
                image_max_entries: 2,
                api_max_entries: 4,
            },
        )
        .await
    }

    fn response(body: &str) -> CachedResponse {
        CachedResponse::ok("application/json", body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn mutating_requests_are_never_intercepted() {
        let fetcher = Arc::new(ScriptedFetch::new());
        let router = router_with(Arc::clone(&fetcher)).await;

        let mut request = CacheRequest::get(ResourceKind::Api, "https://api.test/quotes");
        request.method = "POST".to_string();
        let outcome = router.handle(request).await.expect("handle");

        assert_eq!(outcome, RouterOutcome::PassThrough);
        assert_eq!(fetcher.call_count(), 0, "router must not touch the network");
    }

    #[tokio::test]
    async fn navigation_serves_last_good_shell_when_offline() {
        let fetcher = Arc::new(ScriptedFetch::new());
        fetcher.script("/", CachedResponse::ok("text/html", b"shell".to_vec())).await;
        let router = router_with(Arc::clone(&fetcher)).await;

        let request = CacheRequest::get(ResourceKind::Document, "/");
        router.handle(request.clone()).await.expect("online fetch");

        // Network is down now; the cached shell comes back.
        let outcome = router.handle(request).await.expect("offline fallback");
        assert_eq!(
            outcome,
            RouterOutcome::Response(CachedResponse::ok("text/html", b"shell".to_vec()))
        );
    }

    #[tokio::test]
    async fn read_api_failure_without_fallback_is_synthetic_503() {
        let fetcher = Arc::new(ScriptedFetch::new());
        let router = router_with(fetcher).await;

        let request = CacheRequest::get(ResourceKind::Api, "https://api.test/clients");
        let outcome = router.handle(request).await.expect("synthetic response");
        match outcome {
            RouterOutcome::Response(response) => {
                assert_eq!(response.status, 503);
                assert_eq!(response.body, b"{\"error\":\"gateway unavailable\"}".to_vec());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_api_failure_with_fallback_serves_cache() {
        let fetcher = Arc::new(ScriptedFetch::new());
        fetcher.script("https://api.test/clients", response("[1,2]")).await;
        let router = router_with(fetcher).await;

        let request = CacheRequest::get(ResourceKind::Api, "https://api.test/clients");
        router.handle(request.clone()).await.expect("online fetch");
        let outcome = router.handle(request).await.expect("fallback");
        assert_eq!(outcome, RouterOutcome::Response(response("[1,2]")));
    }

    #[tokio::test]
    async fn auth_requests_bypass_the_read_cache() {
        let fetcher = Arc::new(ScriptedFetch::new());
        fetcher.script("https://api.test/me", response("{\"id\":1}")).await;
        fetcher.script("https://api.test/me", response("{\"id\":2}")).await;
        let router = router_with(Arc::clone(&fetcher)).await;

        let request = CacheRequest::get(ResourceKind::Api, "https://api.test/me").with_auth();
        router.handle(request.clone()).await.expect("first");
        let outcome = router.handle(request.clone()).await.expect("second");

        // Second call hit the network again instead of any cached copy.
        assert_eq!(outcome, RouterOutcome::Response(response("{\"id\":2}")));
        // And nothing was cached: the next failure surfaces as an error, not
        // a stale authorized response.
        let err = router.handle(request).await.unwrap_err();
        assert!(matches!(err, CacheError::Network(_)));
    }

    #[tokio::test]
    async fn images_are_cache_first() {
        let fetcher = Arc::new(ScriptedFetch::new());
        fetcher
            .script("/logo.png", CachedResponse::ok("image/png", vec![1, 2, 3]))
            .await;
        let router = router_with(Arc::clone(&fetcher)).await;

        let request = CacheRequest::get(ResourceKind::Image, "/logo.png");
        router.handle(request.clone()).await.expect("first");
        router.handle(request).await.expect("second");
        assert_eq!(fetcher.call_count(), 1, "second hit served from cache");
    }

    #[tokio::test]
    async fn static_assets_serve_stale_and_revalidate_in_background() {
        let fetcher = Arc::new(ScriptedFetch::new());
        fetcher.script("/app.css", CachedResponse::ok("text/css", b"old".to_vec())).await;
        fetcher.script("/app.css", CachedResponse::ok("text/css", b"new".to_vec())).await;
        let router = router_with(Arc::clone(&fetcher)).await;

        let request = CacheRequest::get(ResourceKind::Style, "/app.css");
        router.handle(request.clone()).await.expect("cold fetch");

        // Warm hit returns the stale copy immediately.
        let outcome = router.handle(request.clone()).await.expect("warm hit");
        assert_eq!(
            outcome,
            RouterOutcome::Response(CachedResponse::ok("text/css", b"old".to_vec()))
        );

        // The background refresh lands; the next hit sees the new copy.
        for _ in 0..10 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if fetcher.call_count() >= 2 {
                break;
            }
        }
        let outcome = router.handle(request).await.expect("refreshed hit");
        assert_eq!(
            outcome,
            RouterOutcome::Response(CachedResponse::ok("text/css", b"new".to_vec()))
        );
    }

    #[tokio::test]
    async fn classification_uses_structural_signals() {
        let get = |kind| CacheRequest::get(kind, "https://app.test/x");
        assert_eq!(ResourceClass::of(&get(ResourceKind::Document)), ResourceClass::Navigation);
        assert_eq!(ResourceClass::of(&get(ResourceKind::Script)), ResourceClass::StaticAsset);
        assert_eq!(ResourceClass::of(&get(ResourceKind::Font)), ResourceClass::StaticAsset);
        assert_eq!(ResourceClass::of(&get(ResourceKind::Image)), ResourceClass::Image);
        assert_eq!(ResourceClass::of(&get(ResourceKind::Api)), ResourceClass::ReadApi);

        let mut delete = get(ResourceKind::Api);
        delete.method = "DELETE".to_string();
        assert_eq!(ResourceClass::of(&delete), ResourceClass::Mutation);
    }
}
