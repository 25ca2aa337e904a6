//! Ingestion orchestration: paginated fetch, dedup gate, enrichment, persist.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use revdesk_core::{Enrichment, NewReview};
use revdesk_drafts::DraftService;
use revdesk_marketplace::{
    parse_review, MappingError, MarketplaceClient, MarketplaceError, SendReceipt,
};
use revdesk_storage::{ReviewStore, StoreError};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("marketplace credentials are not configured")]
    MissingCredentials,
    #[error("skipping review payload: {0}")]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    #[error("response text is empty")]
    EmptyResponse,
}

/// Bounds for one ingestion cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CyclePlan {
    pub max_batches: u32,
    pub page_size: u32,
    /// 0 disables the creation-date filter.
    pub days_back: u32,
}

impl CyclePlan {
    pub const SCHEDULED: Self = Self {
        max_batches: 1000,
        page_size: 100,
        days_back: 0,
    };
    pub const MANUAL: Self = Self {
        max_batches: 10,
        page_size: 100,
        days_back: 30,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    EmptyBatch,
    ShortBatch,
    BatchLimit,
    FetchFailed(String),
    StoreFailed(String),
}

impl StopReason {
    /// True when the cycle ran out of data rather than hitting a limit or a failure.
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::EmptyBatch | Self::ShortBatch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub batches: u32,
    pub stop: StopReason,
}

pub struct ReviewService {
    marketplace: Arc<MarketplaceClient>,
    store: Arc<dyn ReviewStore>,
    drafts: Option<Arc<DraftService>>,
    auto_draft: bool,
    manual_plan: CyclePlan,
}

impl ReviewService {
    pub fn new(marketplace: Arc<MarketplaceClient>, store: Arc<dyn ReviewStore>) -> Self {
        Self {
            marketplace,
            store,
            drafts: None,
            auto_draft: false,
            manual_plan: CyclePlan::MANUAL,
        }
    }

    /// Attaches the draft service; `auto_draft` enriches reviews at ingestion.
    pub fn with_drafts(mut self, drafts: Arc<DraftService>, auto_draft: bool) -> Self {
        self.drafts = Some(drafts);
        self.auto_draft = auto_draft;
        self
    }

    pub fn with_manual_plan(mut self, plan: CyclePlan) -> Self {
        self.manual_plan = plan;
        self
    }

    pub fn marketplace(&self) -> &MarketplaceClient {
        &self.marketplace
    }

    pub fn store(&self) -> &Arc<dyn ReviewStore> {
        &self.store
    }

    pub fn drafts(&self) -> Option<&Arc<DraftService>> {
        self.drafts.as_ref()
    }

    /// Returns `true` only when this call stored a new review.
    pub async fn process_new_review(&self, raw: &JsonValue) -> Result<bool, IngestError> {
        let incoming = parse_review(raw)?;
        if self
            .store
            .find_by_external_id(&incoming.external_id)
            .await?
            .is_some()
        {
            debug!(external_id = %incoming.external_id, "review already stored");
            return Ok(false);
        }

        let enrichment = match &self.drafts {
            Some(drafts) if self.auto_draft && !incoming.text.trim().is_empty() => {
                drafts.enrich(&incoming.text).await
            }
            _ => Enrichment::default(),
        };

        let external_id = incoming.external_id.clone();
        let review = NewReview::from_incoming(incoming, enrichment, Utc::now());
        match self.store.insert_if_absent(review).await? {
            Some(saved) => {
                info!(
                    external_id = %saved.external_id,
                    rating = saved.rating,
                    sentiment = ?saved.sentiment,
                    drafts = saved.drafts.len(),
                    "stored new review"
                );
                Ok(true)
            }
            None => {
                debug!(external_id = %external_id, "review stored concurrently");
                Ok(false)
            }
        }
    }

    /// One bounded ingestion cycle. Failures end the cycle early and are
    /// reported through `CycleSummary::stop`.
    pub async fn run_ingestion_cycle(&self, plan: CyclePlan) -> CycleSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingestion_cycle", %run_id, max_batches = plan.max_batches, days_back = plan.days_back);
        self.cycle(run_id, plan).instrument(span).await
    }

    async fn cycle(&self, run_id: Uuid, plan: CyclePlan) -> CycleSummary {
        let started_at = Utc::now();
        let page_size = MarketplaceClient::clamp_limit(plan.page_size);
        let mut offset = 0u32;
        let mut fetched = 0usize;
        let mut saved = 0usize;
        let mut duplicates = 0usize;
        let mut skipped = 0usize;
        let mut batches = 0u32;

        info!(page_size, "ingestion cycle started");
        let stop = loop {
            if batches >= plan.max_batches {
                break StopReason::BatchLimit;
            }

            let batch = match self
                .marketplace
                .fetch_reviews(page_size, offset, plan.days_back)
                .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(offset, error = %err, "fetch failed; ending cycle");
                    break StopReason::FetchFailed(err.to_string());
                }
            };
            if batch.is_empty() {
                break StopReason::EmptyBatch;
            }
            batches += 1;
            fetched += batch.len();

            let mut store_failure = None;
            for raw in &batch.reviews {
                match self.process_new_review(raw).await {
                    Ok(true) => saved += 1,
                    Ok(false) => duplicates += 1,
                    Err(IngestError::Mapping(err)) => {
                        skipped += 1;
                        warn!(error = %err, "skipping unmappable review");
                    }
                    Err(err) => {
                        store_failure = Some(err.to_string());
                        break;
                    }
                }
            }
            if let Some(reason) = store_failure {
                warn!(error = %reason, "storage failed; ending cycle");
                break StopReason::StoreFailed(reason);
            }
            if batch.len() < page_size as usize {
                break StopReason::ShortBatch;
            }
            offset = offset.saturating_add(page_size);
        };

        let summary = CycleSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            fetched,
            saved,
            duplicates,
            skipped,
            batches,
            stop,
        };
        info!(
            fetched = summary.fetched,
            saved = summary.saved,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            batches = summary.batches,
            stop = ?summary.stop,
            "ingestion cycle finished"
        );
        summary
    }

    /// Operator-triggered cycle over the recent window.
    pub async fn run_manual_sync(&self) -> Result<CycleSummary, IngestError> {
        if !self.marketplace.validate_credentials() {
            return Err(IngestError::MissingCredentials);
        }
        Ok(self.run_ingestion_cycle(self.manual_plan).await)
    }

    /// Publishes a reply and marks the stored review answered.
    pub async fn send_response(&self, external_id: &str, text: &str) -> Result<SendReceipt, IngestError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(IngestError::EmptyResponse);
        }
        let receipt = self.marketplace.send_response(external_id, text).await?;
        if !self.store.mark_answered(external_id).await? {
            warn!(external_id, "response sent for a review that is not stored locally");
        }
        Ok(receipt)
    }
}
