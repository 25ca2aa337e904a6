//! Marketplace review API client with ranked endpoint fallback.
//!
//! Every logical call walks the candidate list for its operation and applies
//! one policy per response: 2xx accepts, 404/5xx/transport failures move on to
//! the next candidate, and any other 4xx aborts the whole call.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Days, SecondsFormat, Utc};
use revdesk_storage::{JsonRequest, JsonResponse, JsonTransport, StatusClass};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

pub mod endpoints;
pub mod mapping;

pub use endpoints::{EndpointCandidates, Operation};
pub use mapping::{parse_review, MappingError};

pub const CRATE_NAME: &str = "revdesk-marketplace";
pub const DEFAULT_BASE_URL: &str = "https://api-seller.ozon.ru";
pub const MIN_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

const ERROR_BODY_CHARS: usize = 500;
const LOG_BODY_CHARS: usize = 200;
const AUTH_HINT: &str =
    "check the Client-Id and Api-Key headers and that the key has review permissions";

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("marketplace credentials are not configured")]
    MissingCredentials,
    #[error("marketplace rejected credentials ({status}): {hint}; response: {body}")]
    Auth {
        status: u16,
        body: String,
        hint: &'static str,
    },
    #[error("marketplace rate limit hit: {body}")]
    RateLimited { body: String },
    #[error("marketplace returned {status}: {body}")]
    Client { status: u16, body: String },
    #[error("all {attempted} {operation} endpoints failed (last: {last})")]
    Exhausted {
        operation: Operation,
        attempted: usize,
        last: String,
    },
}

impl MarketplaceError {
    /// HTTP status behind the failure, when the marketplace answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Client { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::MissingCredentials | Self::Exhausted { .. } => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct MarketplaceCredentials {
    client_id: String,
    api_key: String,
}

impl MarketplaceCredentials {
    pub fn new(client_id: &str, api_key: &str) -> Self {
        Self {
            client_id: normalize_client_id(client_id),
            api_key: api_key.trim().to_string(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.api_key.is_empty()
    }
}

impl fmt::Debug for MarketplaceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketplaceCredentials")
            .field("client_id", &self.client_id)
            .field("api_key", &if self.api_key.is_empty() { "<empty>" } else { "<redacted>" })
            .finish()
    }
}

/// The marketplace wants a numeric Client-Id; re-render numeric input canonically.
pub fn normalize_client_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<i128>() {
        Ok(n) => n.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub base_url: String,
    pub credentials: MarketplaceCredentials,
    pub endpoints: EndpointCandidates,
    pub review_statuses: Vec<u32>,
}

impl MarketplaceConfig {
    pub fn new(client_id: &str, api_key: &str) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: MarketplaceCredentials::new(client_id, api_key),
            endpoints: EndpointCandidates::default(),
            review_statuses: vec![1],
        }
    }
}

/// One page of reviews, normalized to a top-level list.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReviewBatch {
    pub reviews: Vec<JsonValue>,
    pub total: Option<u64>,
    pub endpoint: String,
}

impl ReviewBatch {
    pub fn len(&self) -> usize {
        self.reviews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendReceipt {
    pub endpoint: String,
    pub data: JsonValue,
}

fn json_u64(value: Option<&JsonValue>) -> Option<u64> {
    match value? {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Lifts `result.reviews` to the top level when the provider nests the list.
pub fn normalize_review_list(body: &JsonValue, endpoint: &str) -> ReviewBatch {
    let top_total = json_u64(body.get("total")).or_else(|| json_u64(body.get("count")));

    if let Some(reviews) = body.get("reviews").and_then(JsonValue::as_array) {
        return ReviewBatch {
            reviews: reviews.clone(),
            total: top_total,
            endpoint: endpoint.to_string(),
        };
    }

    if let Some(nested) = body.get("result").filter(|v| v.is_object()) {
        if let Some(reviews) = nested.get("reviews").and_then(JsonValue::as_array) {
            let total = json_u64(nested.get("count"))
                .or_else(|| json_u64(nested.get("total")))
                .or(top_total);
            info!(count = reviews.len(), "unwrapped nested result.reviews");
            return ReviewBatch {
                reviews: reviews.clone(),
                total,
                endpoint: endpoint.to_string(),
            };
        }
    }

    ReviewBatch {
        reviews: Vec::new(),
        total: top_total,
        endpoint: endpoint.to_string(),
    }
}

pub fn review_list_payload(
    limit: u32,
    offset: u32,
    statuses: &[u32],
    date_from: Option<DateTime<Utc>>,
) -> JsonValue {
    let mut filter = json!({ "statuses": statuses });
    if let Some(date_from) = date_from {
        filter["date_from"] = JsonValue::String(date_from.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    json!({
        "limit": limit,
        "offset": offset,
        "filter": filter,
    })
}

enum Verdict {
    Accept(JsonValue),
    Next(String),
    Abort(MarketplaceError),
}

/// Lower creation-date bound for a `days_back` window. `None` when the
/// window is disabled or reaches past the representable calendar.
pub fn date_floor(now: DateTime<Utc>, days_back: u32) -> Option<DateTime<Utc>> {
    if days_back == 0 {
        return None;
    }
    let floor = now.checked_sub_days(Days::new(u64::from(days_back)));
    if floor.is_none() {
        warn!(days_back, "date window out of range; fetching without a date filter");
    }
    floor
}

fn judge(operation: Operation, response: &JsonResponse) -> Verdict {
    match response.class() {
        StatusClass::Success => match response.json() {
            Ok(value) => Verdict::Accept(value),
            // A send that succeeded must not be replayed on another path.
            Err(_) if operation == Operation::SendResponse => {
                Verdict::Accept(JsonValue::String(response.body.clone()))
            }
            Err(err) => Verdict::Next(format!("undecodable body: {err}")),
        },
        StatusClass::NotFound => Verdict::Next("404 not found".to_string()),
        StatusClass::Unauthorized => Verdict::Abort(MarketplaceError::Auth {
            status: response.status,
            body: response.body_preview(ERROR_BODY_CHARS),
            hint: AUTH_HINT,
        }),
        StatusClass::RateLimited => Verdict::Abort(MarketplaceError::RateLimited {
            body: response.body_preview(ERROR_BODY_CHARS),
        }),
        StatusClass::ClientError => Verdict::Abort(MarketplaceError::Client {
            status: response.status,
            body: response.body_preview(ERROR_BODY_CHARS),
        }),
        StatusClass::ServerError | StatusClass::Unexpected => {
            Verdict::Next(format!("status {}", response.status))
        }
    }
}

pub struct MarketplaceClient {
    config: MarketplaceConfig,
    transport: Arc<dyn JsonTransport>,
}

impl MarketplaceClient {
    pub fn new(config: MarketplaceConfig, transport: Arc<dyn JsonTransport>) -> Self {
        info!(
            client_id = config.credentials.client_id(),
            base_url = %config.base_url,
            "marketplace client initialized"
        );
        Self { config, transport }
    }

    pub fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    pub fn validate_credentials(&self) -> bool {
        self.config.credentials.is_complete()
    }

    pub fn clamp_limit(limit: u32) -> u32 {
        limit.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    /// Fetches one page. `days_back > 0` restricts to reviews newer than now minus that many days.
    pub async fn fetch_reviews(
        &self,
        limit: u32,
        offset: u32,
        days_back: u32,
    ) -> Result<ReviewBatch, MarketplaceError> {
        let date_from = date_floor(Utc::now(), days_back);
        let limit = Self::clamp_limit(limit);
        if let Some(date_from) = date_from {
            info!(days_back, since = %date_from, "filtering reviews by creation date");
        }
        let payload = review_list_payload(limit, offset, &self.config.review_statuses, date_from);
        let urls = self.config.endpoints.resolve(
            Operation::FetchReviews,
            &self.config.base_url,
            None,
        );

        let (endpoint, body) = self
            .call_candidates(Operation::FetchReviews, &urls, payload)
            .instrument(info_span!("fetch_reviews", limit, offset))
            .await?;
        let batch = normalize_review_list(&body, &endpoint);
        info!(count = batch.len(), total = ?batch.total, endpoint = %endpoint, "fetched review page");
        Ok(batch)
    }

    pub async fn send_response(&self, review_id: &str, text: &str) -> Result<SendReceipt, MarketplaceError> {
        let urls = self.config.endpoints.resolve(
            Operation::SendResponse,
            &self.config.base_url,
            Some(review_id),
        );
        info!(review_id, text_chars = text.chars().count(), "sending review response");
        let payload = json!({ "review_id": review_id, "text": text });

        let (endpoint, data) = self
            .call_candidates(Operation::SendResponse, &urls, payload)
            .instrument(info_span!("send_response", review_id))
            .await?;
        info!(endpoint = %endpoint, "response sent");
        Ok(SendReceipt { endpoint, data })
    }

    async fn call_candidates(
        &self,
        operation: Operation,
        urls: &[String],
        payload: JsonValue,
    ) -> Result<(String, JsonValue), MarketplaceError> {
        if !self.validate_credentials() {
            return Err(MarketplaceError::MissingCredentials);
        }

        let mut last = String::from("no candidate endpoints configured");
        for url in urls {
            info!(%operation, url = %url, "trying candidate endpoint");
            let request = self.request(url, payload.clone());
            let response = match self.transport.post_json(&request).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(url = %url, error = %err, "candidate unreachable, trying next");
                    last = format!("{url}: {err}");
                    continue;
                }
            };

            info!(
                url = %url,
                status = response.status,
                body = %response.body_preview(LOG_BODY_CHARS),
                "candidate responded"
            );
            match judge(operation, &response) {
                Verdict::Accept(body) => return Ok((url.clone(), body)),
                Verdict::Next(reason) => {
                    warn!(url = %url, reason = %reason, "candidate rejected, trying next");
                    last = format!("{url}: {reason}");
                }
                Verdict::Abort(err) => {
                    warn!(url = %url, error = %err, "client error, not trying remaining candidates");
                    return Err(err);
                }
            }
        }

        tracing::error!(%operation, attempted = urls.len(), "all candidate endpoints failed");
        Err(MarketplaceError::Exhausted {
            operation,
            attempted: urls.len(),
            last,
        })
    }

    fn request(&self, url: &str, payload: JsonValue) -> JsonRequest {
        JsonRequest::new(url, payload)
            .header("Client-Id", self.config.credentials.client_id.clone())
            .header("Api-Key", self.config.credentials.api_key.clone())
            .header("Accept", "application/json")
    }
}
