//! AI enrichment for reviews: sentiment, category and seller reply drafts.
//!
//! `DraftService` wraps one `LlmBackend` with a quota breaker. A 429 from the
//! backend trips the breaker; while tripped every operation answers from its
//! neutral fallback without touching the network until `reset_quota` is
//! called.

use std::sync::atomic::{AtomicBool, Ordering};

use revdesk_core::{Category, Enrichment, Sentiment};
use tracing::{debug, info, warn};

pub mod backend;
pub mod health;
pub mod labels;
pub mod prompts;

pub use backend::{
    BackendCredentials, BackendError, BackendProfile, CompletionOptions, LlmBackend,
    ProviderKind, UnknownProvider,
};
pub use health::{HealthReport, HealthStatus};
pub use prompts::PromptSet;

pub const CRATE_NAME: &str = "revdesk-drafts";

pub const DEFAULT_TONE: &str = "friendly";
pub const DEFAULT_SIGNATURE: &str = "С уважением,\nКоманда маркетплейса";
pub const DEFAULT_VARIANTS: usize = 3;

const PROBE_PROMPT: &str = "ping";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftDefaults {
    pub tone: String,
    pub signature: String,
    /// Replaces the built-in reply template when set.
    pub custom_prompt: Option<String>,
    pub variants: usize,
}

impl Default for DraftDefaults {
    fn default() -> Self {
        Self {
            tone: DEFAULT_TONE.to_string(),
            signature: DEFAULT_SIGNATURE.to_string(),
            custom_prompt: None,
            variants: DEFAULT_VARIANTS,
        }
    }
}

/// Process-wide "quota exceeded" flag.
#[derive(Debug, Default)]
pub struct QuotaState {
    exceeded: AtomicBool,
}

impl QuotaState {
    pub fn is_exceeded(&self) -> bool {
        self.exceeded.load(Ordering::Acquire)
    }

    /// Returns true only for the call that flipped the flag.
    pub fn trip(&self) -> bool {
        !self.exceeded.swap(true, Ordering::AcqRel)
    }

    pub fn reset(&self) {
        self.exceeded.store(false, Ordering::Release);
    }
}

pub struct DraftService {
    backend: LlmBackend,
    quota: QuotaState,
    prompts: PromptSet,
    defaults: DraftDefaults,
}

impl DraftService {
    pub fn new(backend: LlmBackend, defaults: DraftDefaults) -> Self {
        Self {
            backend,
            quota: QuotaState::default(),
            prompts: PromptSet::default(),
            defaults,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn backend(&self) -> &LlmBackend {
        &self.backend
    }

    pub fn defaults(&self) -> &DraftDefaults {
        &self.defaults
    }

    pub fn quota_exceeded(&self) -> bool {
        self.quota.is_exceeded()
    }

    pub fn reset_quota(&self) {
        if self.quota.is_exceeded() {
            info!(provider = %self.backend.provider(), "AI quota flag cleared");
        }
        self.quota.reset();
    }

    /// Credentials present and quota not tripped.
    pub fn is_available(&self) -> bool {
        !self.quota.is_exceeded() && self.backend.has_credentials()
    }

    pub fn set_model(&self, model: &str) -> bool {
        let changed = self.backend.set_model(model);
        if changed {
            info!(provider = %self.backend.provider(), model, "AI model switched");
        }
        changed
    }

    async fn complete(&self, task: &'static str, prompt: &str, options: CompletionOptions) -> Option<String> {
        if !self.is_available() {
            debug!(task, "AI backend unavailable, skipping completion");
            return None;
        }
        match self.backend.complete(prompt, options).await {
            Ok(text) => Some(text),
            Err(BackendError::RateLimited { body }) => {
                if self.quota.trip() {
                    warn!(
                        task,
                        provider = %self.backend.provider(),
                        body = %body,
                        "AI quota exceeded; completions disabled until reset"
                    );
                }
                None
            }
            Err(err) => {
                warn!(task, provider = %self.backend.provider(), error = %err, "AI completion failed");
                None
            }
        }
    }

    async fn sentiment_of(&self, text: &str) -> Option<Sentiment> {
        let prompt = prompts::render(&self.prompts.sentiment, &[("review_text", text)]);
        self.complete("sentiment", &prompt, CompletionOptions::CLASSIFY)
            .await
            .map(|answer| labels::sentiment_from_answer(&answer))
    }

    async fn category_of(&self, text: &str) -> Option<Category> {
        let prompt = prompts::render(&self.prompts.category, &[("review_text", text)]);
        self.complete("category", &prompt, CompletionOptions::CLASSIFY)
            .await
            .map(|answer| labels::category_from_answer(&answer))
    }

    pub async fn analyze_sentiment(&self, text: &str) -> Sentiment {
        self.sentiment_of(text).await.unwrap_or(Sentiment::Neutral)
    }

    pub async fn categorize_review(&self, text: &str) -> Category {
        self.category_of(text).await.unwrap_or(Category::Other)
    }

    /// Up to `variant_count` reply drafts.
    ///
    /// Empty when the backend is unavailable up front. Otherwise exactly
    /// `variant_count` drafts come back; variants the backend fails on are
    /// replaced with a signed thank-you.
    pub async fn generate_response_drafts(
        &self,
        text: &str,
        variant_count: usize,
        tone: Option<&str>,
        signature: Option<&str>,
        custom_prompt: Option<&str>,
    ) -> Vec<String> {
        if variant_count == 0 || !self.is_available() {
            return Vec::new();
        }

        let tone = tone.unwrap_or(self.defaults.tone.as_str());
        let signature = signature.unwrap_or(self.defaults.signature.as_str());
        let template = custom_prompt
            .or(self.defaults.custom_prompt.as_deref())
            .unwrap_or(self.prompts.response.as_str());

        let mut drafts = Vec::with_capacity(variant_count);
        for variant in 1..=variant_count {
            let number = variant.to_string();
            let prompt = prompts::render(
                template,
                &[
                    ("review_text", text),
                    ("tone", tone),
                    ("signature", signature),
                    ("variant", number.as_str()),
                ],
            );
            let draft = self
                .complete("draft", &prompt, CompletionOptions::GENERATE)
                .await
                .unwrap_or_else(|| prompts::fallback_draft(signature));
            drafts.push(draft);
        }
        drafts
    }

    /// Labels plus default drafts for a freshly ingested review.
    ///
    /// Labels the backend could not produce stay unset.
    pub async fn enrich(&self, text: &str) -> Enrichment {
        if !self.is_available() {
            return Enrichment::default();
        }
        let sentiment = self.sentiment_of(text).await;
        let category = self.category_of(text).await;
        let drafts = self
            .generate_response_drafts(text, self.defaults.variants, None, None, None)
            .await;
        Enrichment {
            sentiment,
            category,
            drafts,
        }
    }

    pub async fn check_health(&self) -> HealthReport {
        let mut report = HealthReport {
            status: HealthStatus::Healthy,
            provider: self.backend.provider(),
            model: self.backend.model(),
            model_ref: None,
            status_code: None,
            quota_exceeded: self.quota.is_exceeded(),
            error: None,
            detail: None,
        };

        if let Some(missing) = self.backend.missing_credential() {
            report.status = HealthStatus::CredentialsMissing;
            report.error = Some(missing.to_string());
            return report;
        }
        report.model_ref = Some(self.backend.model_ref());

        if self.quota.is_exceeded() {
            report.status = HealthStatus::RateLimited;
            report.error = Some("quota exceeded; completions disabled until reset".to_string());
            return report;
        }

        match self.backend.complete(PROBE_PROMPT, CompletionOptions::PROBE).await {
            Ok(_) | Err(BackendError::Empty) => {
                report.status_code = Some(200);
            }
            Err(err) => {
                if matches!(err, BackendError::RateLimited { .. }) && self.quota.trip() {
                    warn!(provider = %report.provider, "AI quota exceeded during health check");
                }
                let (status, code, error, detail) = health::classify_failure(&err);
                report.status = status;
                report.status_code = code;
                report.error = Some(error);
                report.detail = detail;
            }
        }
        report.quota_exceeded = self.quota.is_exceeded();
        debug!(provider = %report.provider, status = ?report.status, "AI health check finished");
        report
    }
}
