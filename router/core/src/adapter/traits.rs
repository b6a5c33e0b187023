//! Provider Adapter Traits
//!
//! Trait definitions for provider adapters. The dispatcher talks to every
//! provider through [`ProviderAdapter`]; each implementation owns its
//! provider's payload shape, auth headers and response extraction.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::registry::{Provider, ProviderKind};
use crate::routing::QueryRequest;

/// Longest upstream error body kept in a [`ProviderCallError`]
const MAX_ERROR_BODY_CHARS: usize = 200;

// ============================================================================
// Call Results
// ============================================================================

/// Text and usage extracted from a provider response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// Generated text
    pub content: String,
    /// Tokens used, if the provider reported usage
    pub tokens_used: Option<u32>,
}

impl Completion {
    /// Create a completion
    pub fn new(content: impl Into<String>, tokens_used: Option<u32>) -> Self {
        Self {
            content: content.into(),
            tokens_used,
        }
    }
}

/// Category of a failed provider call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorKind {
    /// The call exceeded its timeout
    Timeout,
    /// Connection or transport failure
    Network,
    /// Provider returned a non-2xx status
    Status,
    /// Response body could not be understood
    MalformedResponse,
    /// No credential configured for the provider
    MissingCredential,
}

impl fmt::Display for CallErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "network"),
            Self::Status => write!(f, "status"),
            Self::MalformedResponse => write!(f, "malformed response"),
            Self::MissingCredential => write!(f, "missing credential"),
        }
    }
}

/// A single provider call failed
#[derive(Clone, Debug, Error, Serialize)]
#[error("{kind} error{}: {message}", status_suffix(.status))]
pub struct ProviderCallError {
    /// Failure category
    pub kind: CallErrorKind,
    /// HTTP status, when the provider answered
    pub status: Option<u16>,
    /// Human-readable detail
    pub message: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl ProviderCallError {
    /// The call did not finish within `timeout`
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            kind: CallErrorKind::Timeout,
            status: None,
            message: format!("no response within {}ms", timeout.as_millis()),
        }
    }

    /// Transport-level failure
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: CallErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    /// Non-2xx response; the body is truncated
    pub fn status(status: u16, body: impl AsRef<str>) -> Self {
        Self {
            kind: CallErrorKind::Status,
            status: Some(status),
            message: truncate(body.as_ref(), MAX_ERROR_BODY_CHARS),
        }
    }

    /// Response body was missing expected fields or was not JSON
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: CallErrorKind::MalformedResponse,
            status: None,
            message: message.into(),
        }
    }

    /// Provider has no API key configured
    #[must_use]
    pub fn missing_credential(provider: &str) -> Self {
        Self {
            kind: CallErrorKind::MissingCredential,
            status: None,
            message: format!("no API key configured for provider '{provider}'"),
        }
    }

    /// Whether this failure was a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == CallErrorKind::Timeout
    }
}

impl From<reqwest::Error> for ProviderCallError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self {
                kind: CallErrorKind::Timeout,
                status: None,
                message: error.to_string(),
            };
        }
        if error.is_decode() {
            return Self::malformed(error.to_string());
        }
        match error.status() {
            Some(status) => Self::status(status.as_u16(), error.to_string()),
            None => Self::network(error.to_string()),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

// ============================================================================
// Adapter Trait
// ============================================================================

/// Uniform capability every provider adapter implements
///
/// Implementations must not retry internally; the dispatcher owns retry and
/// fallback decisions.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Wire format family this adapter speaks
    fn kind(&self) -> ProviderKind;

    /// Send `request` to `provider` and extract the completion
    async fn invoke(
        &self,
        provider: &Provider,
        request: &QueryRequest,
        timeout: Duration,
    ) -> Result<Completion, ProviderCallError>;
}

// ============================================================================
// Shared HTTP plumbing
// ============================================================================

/// POST a JSON payload and decode a JSON response
///
/// The builder already carries the provider-specific URL and headers.
pub(crate) async fn post_json<P, R>(
    builder: reqwest::RequestBuilder,
    payload: &P,
    timeout: Duration,
) -> Result<R, ProviderCallError>
where
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = builder.timeout(timeout).json(payload).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderCallError::status(status.as_u16(), body));
    }

    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| ProviderCallError::malformed(format!("invalid response body: {e}")))
}

/// Effective token limit for a call
pub(crate) fn effective_max_tokens(provider: &Provider, request: &QueryRequest) -> u32 {
    request.max_tokens.unwrap_or(provider.max_tokens)
}

/// Effective temperature for a call
pub(crate) fn effective_temperature(provider: &Provider, request: &QueryRequest) -> f32 {
    request.temperature.unwrap_or(provider.temperature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_truncates_body() {
        let body = "x".repeat(500);
        let error = ProviderCallError::status(502, &body);
        assert_eq!(error.status, Some(502));
        assert_eq!(error.kind, CallErrorKind::Status);
        assert!(error.message.len() < 210);
        assert!(error.message.ends_with("..."));
    }

    #[test]
    fn test_error_display() {
        let error = ProviderCallError::status(503, "overloaded");
        assert_eq!(error.to_string(), "status error (status 503): overloaded");

        let error = ProviderCallError::timeout(Duration::from_millis(250));
        assert_eq!(error.to_string(), "timeout error: no response within 250ms");
        assert!(error.is_timeout());
    }

    #[test]
    fn test_effective_parameters_prefer_request_overrides() {
        let provider = Provider::new("gpt-4", ProviderKind::OpenAi, "http://localhost")
            .with_max_tokens(4096)
            .with_temperature(0.7);

        let plain = QueryRequest::new("hi");
        assert_eq!(effective_max_tokens(&provider, &plain), 4096);
        assert!((effective_temperature(&provider, &plain) - 0.7).abs() < f32::EPSILON);

        let tuned = QueryRequest::new("hi").with_max_tokens(64).with_temperature(0.0);
        assert_eq!(effective_max_tokens(&provider, &tuned), 64);
        assert!(effective_temperature(&provider, &tuned).abs() < f32::EPSILON);
    }
}
