use serde::Serialize;

use crate::backend::{BackendError, ProviderKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    CredentialsMissing,
    RateLimited,
    AuthFailed,
    NotFound,
    ApiError,
    NetworkError,
}

/// Result of a backend reachability probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub provider: ProviderKind,
    pub model: String,
    pub model_ref: Option<String>,
    pub status_code: Option<u16>,
    pub quota_exceeded: bool,
    pub error: Option<String>,
    pub detail: Option<String>,
}

impl HealthReport {
    pub fn is_available(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Status, HTTP code, error line and detail for a failed probe.
pub(crate) fn classify_failure(
    err: &BackendError,
) -> (HealthStatus, Option<u16>, String, Option<String>) {
    match err {
        BackendError::MissingCredentials(what) => {
            (HealthStatus::CredentialsMissing, None, (*what).to_string(), None)
        }
        BackendError::RateLimited { body } => (
            HealthStatus::RateLimited,
            Some(429),
            err.to_string(),
            Some(body.clone()).filter(|b| !b.is_empty()),
        ),
        BackendError::Auth { status, detail } => (
            HealthStatus::AuthFailed,
            Some(*status),
            err.to_string(),
            Some(detail.clone()),
        ),
        BackendError::NotFound { status, detail } => (
            HealthStatus::NotFound,
            Some(*status),
            err.to_string(),
            Some(detail.clone()),
        ),
        BackendError::Api { status, body } => (
            HealthStatus::ApiError,
            Some(*status),
            err.to_string(),
            Some(body.clone()).filter(|b| !b.is_empty()),
        ),
        BackendError::Network(transport) => (
            HealthStatus::NetworkError,
            None,
            transport.to_string(),
            None,
        ),
        BackendError::Parse(_) | BackendError::Empty => (
            HealthStatus::ApiError,
            Some(200),
            err.to_string(),
            None,
        ),
    }
}
