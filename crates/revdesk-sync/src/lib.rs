//! Review ingestion wiring: configuration, the orchestrator and the poller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use revdesk_drafts::{DraftService, LlmBackend};
use revdesk_marketplace::MarketplaceClient;
use revdesk_storage::{HttpClientConfig, HttpTransport, ReviewStore};
use tracing::info;

pub mod config;
pub mod poller;
pub mod service;

pub use config::AppConfig;
pub use poller::{PollOutcome, PollerError, PollerState, ReviewPoller};
pub use service::{CyclePlan, CycleSummary, IngestError, ReviewService, StopReason};

pub const CRATE_NAME: &str = "revdesk-sync";

const USER_AGENT: &str = concat!("revdesk/", env!("CARGO_PKG_VERSION"));

fn http_transport(timeout_secs: u64) -> Result<Arc<HttpTransport>> {
    let transport = HttpTransport::new(HttpClientConfig {
        timeout: Duration::from_secs(timeout_secs.max(1)),
        user_agent: Some(USER_AGENT.to_string()),
    })?;
    Ok(Arc::new(transport))
}

pub fn build_marketplace_client(config: &AppConfig) -> Result<MarketplaceClient> {
    let marketplace = config.marketplace_config()?;
    let transport = http_transport(config.marketplace_timeout_secs)
        .context("building marketplace transport")?;
    Ok(MarketplaceClient::new(marketplace, transport))
}

pub fn build_draft_service(config: &AppConfig) -> Result<DraftService> {
    let (profile, credentials, model) = config.ai_backend()?;
    let transport = http_transport(config.ai_timeout_secs).context("building AI transport")?;
    let backend = LlmBackend::new(profile, credentials, Some(model.as_str()), transport);
    if !backend.has_credentials() {
        info!(provider = %backend.provider(), "AI credentials not configured; drafts disabled");
    }
    Ok(DraftService::new(backend, config.draft_defaults()))
}

pub fn build_review_service(config: &AppConfig, store: Arc<dyn ReviewStore>) -> Result<ReviewService> {
    let marketplace = Arc::new(build_marketplace_client(config)?);
    let drafts = Arc::new(build_draft_service(config)?);
    Ok(ReviewService::new(marketplace, store)
        .with_drafts(drafts, config.auto_response_enabled)
        .with_manual_plan(config.manual_plan()))
}

pub fn build_poller(config: &AppConfig, service: Arc<ReviewService>) -> ReviewPoller {
    ReviewPoller::new(service, config.scheduled_plan(), config.polling_interval_minutes)
}
