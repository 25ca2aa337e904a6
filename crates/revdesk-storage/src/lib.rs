//! Review persistence + HTTP transport utilities for revdesk.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use revdesk_core::{NewReview, Review};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info_span, Instrument};

pub mod memory;
pub mod postgres;
pub mod testing;

pub use memory::MemoryReviewStore;
pub use postgres::PgReviewStore;

pub const CRATE_NAME: &str = "revdesk-storage";

/// Outbound JSON POST.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: JsonValue,
}

impl JsonRequest {
    pub fn new(url: impl Into<String>, body: JsonValue) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response: status plus the undecoded body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonResponse {
    pub status: u16,
    pub url: String,
    pub body: String,
}

impl JsonResponse {
    pub fn class(&self) -> StatusClass {
        classify_status(self.status)
    }

    pub fn json(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn body_preview(&self, max_chars: usize) -> String {
        truncate_chars(&self.body, max_chars)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    NotFound,
    Unauthorized,
    RateLimited,
    ClientError,
    ServerError,
    Unexpected,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 | 403 => StatusClass::Unauthorized,
        404 => StatusClass::NotFound,
        429 => StatusClass::RateLimited,
        400..=499 => StatusClass::ClientError,
        500..=599 => StatusClass::ServerError,
        _ => StatusClass::Unexpected,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

/// Cuts `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...(truncated)", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Seam between the API clients and the network.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    async fn post_json(&self, request: &JsonRequest) -> Result<JsonResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

/// reqwest-backed transport; every request carries the configured timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl JsonTransport for HttpTransport {
    async fn post_json(&self, request: &JsonRequest) -> Result<JsonResponse, TransportError> {
        let span = info_span!("http_post", url = %request.url);
        async {
            let mut builder = self.client.post(&request.url).json(&request.body);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let resp = builder
                .send()
                .await
                .map_err(|err| classify_reqwest_error(&err))?;
            let status = resp.status().as_u16();
            let url = resp.url().to_string();
            let body = resp
                .text()
                .await
                .map_err(|err| classify_reqwest_error(&err))?;
            tracing::debug!(status, bytes = body.len(), "http response");
            Ok(JsonResponse { status, url, body })
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid stored value for review {external_id}: {reason}")]
    Corrupt { external_id: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Review persistence contract used by the ingestion pipeline.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Review>, StoreError>;

    /// Inserts atomically. `None` means a review with the same external id
    /// already exists and nothing was written.
    async fn insert_if_absent(&self, review: NewReview) -> Result<Option<Review>, StoreError>;

    /// Returns `false` when no review has that external id.
    async fn mark_answered(&self, external_id: &str) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}
