//! FieldOps agent: the background execution context.
//!
//! Owns the durable stores, drains the mutation queue, serves the read
//! cache, and gates push notifications. Foreground pages talk to it over
//! the bus; everything here must keep working with zero pages open.

mod bus;
mod context;
mod engine;
mod gate;
mod net;
mod wake;

use anyhow::Context as _;
use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use fieldops_cache::{CacheConfig, CacheError, CacheRequest, CacheRouter, CachedResponse, Fetch};
use fieldops_delivery::HttpDeliveryClient;
use fieldops_storage_sqlite::db::write_actor::spawn_writer;
use fieldops_storage_sqlite::db::{create_pool, init, run_migrations};
use fieldops_storage_sqlite::{
    ConflictLogRepository, MutationQueueRepository, PushPreferenceRepository,
};

use crate::bus::{AgentBus, PageMessage};
use crate::context::{AgentContext, SyncPolicy, SyncRuntimeState};
use crate::engine::run_sync_cycle;
use crate::net::{spawn_reachability_probe, ConnectivityMonitor};

const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const REACHABILITY_INTERVAL_SECS: u64 = 30;

fn api_base_url() -> String {
    std::env::var("FIELDOPS_API_URL")
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

fn app_data_dir() -> String {
    std::env::var("FIELDOPS_DATA_DIR")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "fieldops-data".to_string())
}

fn cache_version() -> String {
    std::env::var("FIELDOPS_CACHE_VERSION")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "v1".to_string())
}

/// Network backend for the cache router.
struct HttpFetch {
    client: reqwest::Client,
}

#[async_trait]
impl Fetch for HttpFetch {
    async fn fetch(&self, request: &CacheRequest) -> Result<CachedResponse, CacheError> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(|err| CacheError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|err| CacheError::Network(err.to_string()))?;
        Ok(CachedResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

/// Standalone hosts have no wake scheduler; the in-process loop covers the
/// cadence while the agent is running.
struct NoPlatformScheduler;

impl wake::WakeRegistrar for NoPlatformScheduler {
    fn register_wake(&self, _tag: &str, _min_interval_secs: u64) -> anyhow::Result<()> {
        anyhow::bail!("no platform wake scheduler on this host")
    }
}

/// Host events arrive as JSON lines on stdin, one envelope per line.
/// Push delivery: `{"kind":"push","payload":{...},"anyPageFocused":false}`
/// and `{"kind":"notificationActivated","route":"/quotes/18"}`. Page
/// messages ride the same transport: `{"kind":"forceActivateUpdate"}` and
/// `{"kind":"pushPreferencesUpdate","flags":{"notify_status_change":false}}`.
fn spawn_platform_listener(
    push_gate: Arc<gate::PushGate>,
    pages: tokio::sync::mpsc::UnboundedSender<PageMessage>,
) {
    use tokio::io::AsyncBufReadExt;

    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let envelope: serde_json::Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(err) => {
                    warn!("unreadable platform event: {err}");
                    continue;
                }
            };
            match envelope.get("kind").and_then(|v| v.as_str()) {
                Some("push") => {
                    let payload = envelope
                        .get("payload")
                        .cloned()
                        .unwrap_or(serde_json::Value::Null);
                    let focused = envelope
                        .get("anyPageFocused")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    match push_gate.handle_push(&payload, focused) {
                        gate::NotificationDecision::Displayed(payload) => {
                            info!("notification: {} - {}", payload.title, payload.body);
                        }
                        gate::NotificationDecision::Suppressed(_) => {}
                    }
                }
                Some("notificationActivated") => {
                    let route = envelope
                        .get("route")
                        .and_then(|v| v.as_str())
                        .unwrap_or("/")
                        .to_string();
                    match push_gate.handle_activation(route) {
                        gate::ActivationTarget::ExistingPage => {}
                        gate::ActivationTarget::OpenNewPage(route) => {
                            info!("open new page at {route}");
                        }
                    }
                }
                Some("forceActivateUpdate") => {
                    let _ = pages.send(PageMessage::ForceActivateUpdate);
                }
                Some("pushPreferencesUpdate") => {
                    match serde_json::from_value(
                        envelope.get("flags").cloned().unwrap_or_default(),
                    ) {
                        Ok(snapshot) => {
                            let _ = pages.send(PageMessage::PushPreferencesUpdate(snapshot));
                        }
                        Err(err) => warn!("unreadable preference update: {err}"),
                    }
                }
                other => warn!("unknown platform event kind: {other:?}"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let base_url = api_base_url();
    let access_token =
        std::env::var("FIELDOPS_API_TOKEN").context("FIELDOPS_API_TOKEN must be set")?;

    // Durable stores behind the single writer task.
    let db_path = init(&app_data_dir())?;
    run_migrations(&db_path)?;
    let pool = create_pool(&db_path)?;
    let writer = spawn_writer(pool.as_ref().clone());
    let queue = Arc::new(MutationQueueRepository::new(pool.clone(), writer.clone()));
    let conflict_log = Arc::new(ConflictLogRepository::new(pool.clone(), writer.clone()));
    let preferences = Arc::new(PushPreferenceRepository::new(pool, writer));

    let delivery = Arc::new(HttpDeliveryClient::new(&base_url, &access_token)?);
    // Pessimistic start: queued items stay pending until the first probe
    // confirms the link, and the regained-connectivity watcher drains then.
    let connectivity = Arc::new(ConnectivityMonitor::new(false));
    spawn_reachability_probe(
        Arc::clone(&connectivity),
        base_url.clone(),
        Duration::from_secs(REACHABILITY_INTERVAL_SECS),
    );

    let fetch = Arc::new(HttpFetch {
        client: reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?,
    });
    let router = Arc::new(
        CacheRouter::new(
            fetch,
            CacheConfig {
                version: cache_version(),
                ..CacheConfig::default()
            },
        )
        .await,
    );
    // New agent version takes over: stale cache partitions go now.
    let dropped = router.activate().await;
    if !dropped.is_empty() {
        info!("dropped stale cache partitions: {dropped:?}");
    }

    let (agent_bus, mut page_rx) = AgentBus::new(32);
    let ctx = Arc::new(AgentContext {
        queue,
        conflict_log,
        preferences,
        delivery,
        connectivity: Arc::clone(&connectivity) as Arc<dyn net::ConnectivityProbe>,
        policy: SyncPolicy::default(),
        runtime: Arc::new(SyncRuntimeState::default()),
        bus: agent_bus,
    });

    let push_gate = Arc::new(gate::PushGate::new(
        Arc::clone(&ctx.preferences),
        ctx.bus.clone(),
    ));
    spawn_platform_listener(push_gate, ctx.bus.page_sender());

    info!("fieldops agent started, api={base_url}");

    // Startup trigger, then a drain whenever connectivity comes back.
    if let Err(err) = run_sync_cycle(&ctx).await {
        warn!("startup sync failed: {err}");
    }
    {
        let ctx = Arc::clone(&ctx);
        let mut online_rx = connectivity.subscribe();
        tokio::spawn(async move {
            while online_rx.changed().await.is_ok() {
                if *online_rx.borrow_and_update() {
                    info!("connectivity regained, draining queue");
                    if let Err(err) = run_sync_cycle(&ctx).await {
                        warn!("reconnect sync failed: {err}");
                    }
                }
            }
        });
    }
    wake::register_periodic_wake(&NoPlatformScheduler);
    wake::ensure_background_loop_started(Arc::clone(&ctx)).await;

    // Serve foreground pages until shutdown.
    while let Some(message) = page_rx.recv().await {
        match message {
            PageMessage::ForceActivateUpdate => {
                let dropped = router.activate().await;
                info!("forced activation, dropped partitions: {dropped:?}");
            }
            PageMessage::PushPreferencesUpdate(snapshot) => {
                if let Err(err) = ctx.preferences.save(snapshot).await {
                    error!("push preference save failed: {err}");
                }
            }
        }
    }

    wake::ensure_background_loop_stopped(ctx).await;
    Ok(())
}
