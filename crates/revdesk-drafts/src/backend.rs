//! Completion backends described as data.
//!
//! A provider is a `BackendProfile`: endpoint, auth scheme, wire format and
//! model list. Adding a provider means adding a profile, not a code path.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use revdesk_storage::{JsonRequest, JsonTransport, StatusClass, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, warn};

const DETAIL_CHARS: usize = 1500;

pub const YANDEX_COMPLETION_URL: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Yandex,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAi => "openai",
            Self::Yandex => "yandex",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown AI provider: {0} (expected openai or yandex)")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" | "gpt" => Ok(Self::OpenAi),
            "yandex" | "yandexgpt" => Ok(Self::Yandex),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `modelUri` + `completionOptions`; answer under `result.alternatives`.
    YandexCompletion,
    /// Chat completions; answer under `choices`.
    OpenAiChat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionOptions {
    pub const CLASSIFY: Self = Self {
        temperature: 0.1,
        max_tokens: 50,
    };
    pub const GENERATE: Self = Self {
        temperature: 0.7,
        max_tokens: 200,
    };
    pub const PROBE: Self = Self {
        temperature: 0.0,
        max_tokens: 5,
    };
}

impl WireFormat {
    pub fn request_body(&self, model_ref: &str, prompt: &str, options: CompletionOptions) -> JsonValue {
        match self {
            Self::YandexCompletion => json!({
                "modelUri": model_ref,
                "completionOptions": {
                    "stream": false,
                    "temperature": options.temperature,
                    "maxTokens": options.max_tokens,
                },
                "messages": [{ "role": "user", "text": prompt }],
            }),
            Self::OpenAiChat => json!({
                "model": model_ref,
                "stream": false,
                "temperature": options.temperature,
                "max_tokens": options.max_tokens,
                "messages": [{ "role": "user", "content": prompt }],
            }),
        }
    }

    /// First alternative's text, if the body has one.
    pub fn completion_text(&self, body: &JsonValue) -> Option<String> {
        let text = match self {
            Self::YandexCompletion => body
                .pointer("/result/alternatives/0/message/text")
                .and_then(JsonValue::as_str),
            Self::OpenAiChat => body
                .pointer("/choices/0/message/content")
                .and_then(JsonValue::as_str),
        };
        text.map(|t| t.trim().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Api-Key <secret>`
    ApiKey,
    /// `Authorization: Bearer <secret>`
    Bearer,
}

impl AuthScheme {
    fn header_value(&self, secret: &str) -> String {
        match self {
            Self::ApiKey => format!("Api-Key {secret}"),
            Self::Bearer => format!("Bearer {secret}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendProfile {
    pub provider: ProviderKind,
    pub endpoint: String,
    pub wire: WireFormat,
    pub auth: AuthScheme,
    pub models: Vec<String>,
    pub default_model: String,
    pub requires_folder: bool,
    pub auth_hint: String,
    pub not_found_hint: String,
}

impl BackendProfile {
    pub fn yandex() -> Self {
        Self {
            provider: ProviderKind::Yandex,
            endpoint: YANDEX_COMPLETION_URL.to_string(),
            wire: WireFormat::YandexCompletion,
            auth: AuthScheme::ApiKey,
            models: ["yandexgpt", "yandexgpt-lite", "yandexgpt-pro"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_model: "yandexgpt".to_string(),
            requires_folder: true,
            auth_hint: "Check: 1) the API key is the secret, not the key id; \
                2) header is `Authorization: Api-Key <secret>`; \
                3) modelUri is gpt://<folder_id>/<model>/latest; \
                4) the service account has ai.languageModels.user on the folder."
                .to_string(),
            not_found_hint: "Ensure the URL ends in /foundationModels/v1/completion and \
                modelUri is gpt://<folder_id>/<model>/latest."
                .to_string(),
        }
    }

    pub fn openai() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            endpoint: OPENAI_CHAT_URL.to_string(),
            wire: WireFormat::OpenAiChat,
            auth: AuthScheme::Bearer,
            models: ["gpt-3.5-turbo", "gpt-4", "gpt-4-turbo", "gpt-4o-mini"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_model: "gpt-3.5-turbo".to_string(),
            requires_folder: false,
            auth_hint: "Check that the API key is active and sent as `Authorization: Bearer <key>`, \
                and that billing is enabled for the organization."
                .to_string(),
            not_found_hint: "Ensure the model name is available to this API key.".to_string(),
        }
    }

    pub fn for_provider(provider: ProviderKind) -> Self {
        match provider {
            ProviderKind::OpenAi => Self::openai(),
            ProviderKind::Yandex => Self::yandex(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct BackendCredentials {
    pub api_key: String,
    pub folder_id: Option<String>,
}

impl BackendCredentials {
    pub fn new(api_key: &str, folder_id: Option<&str>) -> Self {
        Self {
            api_key: api_key.trim().to_string(),
            folder_id: folder_id
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from),
        }
    }
}

impl fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendCredentials")
            .field("api_key", &if self.api_key.is_empty() { "<empty>" } else { "<redacted>" })
            .field("folder_id", &self.folder_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    MissingCredentials(&'static str),
    #[error("rate limit / quota exceeded (429)")]
    RateLimited { body: String },
    #[error("authentication/authorization failed ({status})")]
    Auth { status: u16, detail: String },
    #[error("endpoint or model not found ({status})")]
    NotFound { status: u16, detail: String },
    #[error("API error: HTTP {status}")]
    Api { status: u16, body: String },
    #[error(transparent)]
    Network(#[from] TransportError),
    #[error("unexpected response shape: {0}")]
    Parse(String),
    #[error("backend returned an empty completion")]
    Empty,
}

/// Profile + credentials + selected model, speaking over a `JsonTransport`.
pub struct LlmBackend {
    profile: BackendProfile,
    credentials: BackendCredentials,
    model: RwLock<String>,
    transport: Arc<dyn JsonTransport>,
}

impl LlmBackend {
    pub fn new(
        profile: BackendProfile,
        credentials: BackendCredentials,
        model: Option<&str>,
        transport: Arc<dyn JsonTransport>,
    ) -> Self {
        let model = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) if profile.supports_model(m) => m.to_string(),
            Some(m) => {
                warn!(provider = %profile.provider, model = m, fallback = %profile.default_model, "unsupported model, using default");
                profile.default_model.clone()
            }
            None => profile.default_model.clone(),
        };
        debug!(
            provider = %profile.provider,
            model = %model,
            credentials = ?credentials,
            "llm backend initialized"
        );
        Self {
            profile,
            credentials,
            model: RwLock::new(model),
            transport,
        }
    }

    pub fn profile(&self) -> &BackendProfile {
        &self.profile
    }

    pub fn provider(&self) -> ProviderKind {
        self.profile.provider
    }

    pub fn model(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Switches model; only models listed in the profile are accepted.
    pub fn set_model(&self, model: &str) -> bool {
        if !self.profile.supports_model(model) {
            warn!(model, current = %self.model(), "model not in profile list");
            return false;
        }
        *self
            .model
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = model.to_string();
        true
    }

    pub fn missing_credential(&self) -> Option<&'static str> {
        if self.credentials.api_key.is_empty() {
            return Some("Missing API key");
        }
        if self.profile.requires_folder && self.credentials.folder_id.is_none() {
            return Some("Missing folder id");
        }
        None
    }

    pub fn has_credentials(&self) -> bool {
        self.missing_credential().is_none()
    }

    pub fn model_ref(&self) -> String {
        let model = self.model();
        match self.profile.wire {
            WireFormat::YandexCompletion => format!(
                "gpt://{}/{}/latest",
                self.credentials.folder_id.as_deref().unwrap_or_default(),
                model
            ),
            WireFormat::OpenAiChat => model,
        }
    }

    pub async fn complete(&self, prompt: &str, options: CompletionOptions) -> Result<String, BackendError> {
        if let Some(missing) = self.missing_credential() {
            return Err(BackendError::MissingCredentials(missing));
        }

        let body = self.profile.wire.request_body(&self.model_ref(), prompt, options);
        let request = JsonRequest::new(&self.profile.endpoint, body).header(
            "Authorization",
            self.profile.auth.header_value(&self.credentials.api_key),
        );
        let response = self.transport.post_json(&request).await?;

        match response.class() {
            StatusClass::Success => {
                let json = response
                    .json()
                    .map_err(|e| BackendError::Parse(e.to_string()))?;
                let text = self
                    .profile
                    .wire
                    .completion_text(&json)
                    .ok_or_else(|| BackendError::Parse("no completion alternatives".into()))?;
                if text.is_empty() {
                    return Err(BackendError::Empty);
                }
                Ok(text)
            }
            StatusClass::RateLimited => Err(BackendError::RateLimited {
                body: response.body_preview(DETAIL_CHARS),
            }),
            StatusClass::Unauthorized => {
                let body = response.body_preview(DETAIL_CHARS);
                let detail = if body.is_empty() {
                    self.profile.auth_hint.clone()
                } else {
                    format!("{}\nAPI response:\n{body}", self.profile.auth_hint)
                };
                Err(BackendError::Auth {
                    status: response.status,
                    detail,
                })
            }
            StatusClass::NotFound => Err(BackendError::NotFound {
                status: response.status,
                detail: format!(
                    "{}\nAPI response: {}",
                    self.profile.not_found_hint,
                    response.body_preview(DETAIL_CHARS)
                ),
            }),
            _ => Err(BackendError::Api {
                status: response.status,
                body: response.body_preview(DETAIL_CHARS),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_from_config_strings() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(" yandex ".parse::<ProviderKind>().unwrap(), ProviderKind::Yandex);
        assert!("claude".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn yandex_body_uses_model_uri_and_completion_options() {
        let body = WireFormat::YandexCompletion.request_body(
            "gpt://b1folder/yandexgpt/latest",
            "ping",
            CompletionOptions::PROBE,
        );
        assert_eq!(body["modelUri"], "gpt://b1folder/yandexgpt/latest");
        assert_eq!(body["completionOptions"]["stream"], false);
        assert_eq!(body["completionOptions"]["maxTokens"], 5);
        assert_eq!(body["messages"][0]["text"], "ping");
    }

    #[test]
    fn completion_text_reads_the_first_alternative() {
        let yandex = serde_json::json!({
            "result": {"alternatives": [
                {"message": {"role": "assistant", "text": " Положительная \n"}},
                {"message": {"role": "assistant", "text": "ignored"}}
            ]}
        });
        assert_eq!(
            WireFormat::YandexCompletion.completion_text(&yandex).as_deref(),
            Some("Положительная")
        );
        let openai = serde_json::json!({"choices": [{"message": {"content": "delivery"}}]});
        assert_eq!(
            WireFormat::OpenAiChat.completion_text(&openai).as_deref(),
            Some("delivery")
        );
        assert_eq!(WireFormat::OpenAiChat.completion_text(&yandex), None);
    }

    #[test]
    fn credentials_debug_output_hides_the_key() {
        let creds = BackendCredentials::new("sk-live-123", Some(" b1g "));
        assert_eq!(creds.folder_id.as_deref(), Some("b1g"));
        assert!(!format!("{creds:?}").contains("sk-live-123"));
    }
}
