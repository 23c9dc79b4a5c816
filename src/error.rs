//! Error taxonomy for calls to the reasoning and embedding services.
//!
//! Application wiring (config loading, CLI, index building) reports errors
//! with `anyhow`. Anything that crosses a collaborator boundary at serve time
//! is classified as a [`ServiceError`] so callers can decide between retrying,
//! degrading to a fallback answer, and failing fast.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing or invalid settings or credentials. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Rate limiting, model loading, timeouts, 5xx. Worth retrying.
    #[error("transient service failure: {0}")]
    Transient(String),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("malformed service response: {0}")]
    MalformedResponse(String),

    /// Non-retryable client error (4xx other than 401/403/429).
    #[error("request rejected: {0}")]
    Request(String),

    /// Transient failures outlasted every retry and round trip.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    /// Whether the failure should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }

    /// Whether the failure means the process is misconfigured.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ServiceError::Configuration(_)
                | ServiceError::Authentication(_)
                | ServiceError::Permission(_)
        )
    }

    /// Classify a non-success HTTP status from a collaborator.
    ///
    /// 429 and 5xx are transient, 401 and 403 are credential problems, every
    /// other status is a rejected request.
    pub fn from_status(service: &str, status: u16, body: &str) -> Self {
        let detail = format!("{} returned {}: {}", service, status, body);
        match status {
            401 => ServiceError::Authentication(detail),
            403 => ServiceError::Permission(detail),
            429 | 500..=599 => ServiceError::Transient(detail),
            _ => ServiceError::Request(detail),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ServiceError::Transient(err.to_string())
        } else if err.is_decode() {
            ServiceError::MalformedResponse(err.to_string())
        } else {
            ServiceError::Other(err.into())
        }
    }
}
