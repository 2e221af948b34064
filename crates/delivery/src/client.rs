//! Delivery API client for replaying queued mutations against the backend.
//!
//! The server deduplicates on the `Idempotency-Key` header (external
//! contract), so a client-side retry after a successful-but-unacknowledged
//! call does not double-apply.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DeliveryError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// One queued mutation on its way to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedDelivery {
    pub idempotency_key: String,
    pub mutation_type: String,
    pub entity: String,
    pub payload: serde_json::Value,
}

/// Server acknowledgement of one delivery.
///
/// `applied == false` means the server deduplicated on the idempotency key;
/// either way the mutation is durably applied remotely. `server_snapshot`,
/// when present and diverging from the client's assumption, feeds the
/// conflict resolver.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub applied: bool,
    #[serde(default)]
    pub server_snapshot: Option<serde_json::Value>,
}

/// Seam between the sync engine and the network, mockable in tests.
#[async_trait]
pub trait DeliveryApi: Send + Sync {
    async fn deliver(&self, delivery: &QueuedDelivery) -> Result<DeliveryReceipt>;
}

/// Client for the FieldOps mutation replay API.
#[derive(Debug, Clone)]
pub struct HttpDeliveryClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpDeliveryClient {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    fn headers(&self, idempotency_key: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.access_token))
                .map_err(|_| DeliveryError::InvalidRequest("malformed access token".into()))?,
        );
        headers.insert(
            "Idempotency-Key",
            HeaderValue::from_str(idempotency_key).map_err(|_| {
                DeliveryError::InvalidRequest("malformed idempotency key".into())
            })?,
        );
        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }
        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }
}

#[async_trait]
impl DeliveryApi for HttpDeliveryClient {
    async fn deliver(&self, delivery: &QueuedDelivery) -> Result<DeliveryReceipt> {
        let url = format!("{}/mutations/{}", self.base_url, delivery.entity);
        let response = self
            .client
            .post(&url)
            .headers(self.headers(&delivery.idempotency_key)?)
            .json(delivery)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(DeliveryError::api(status.as_u16(), body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}
