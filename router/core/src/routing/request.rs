//! Query request and response types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RouterError;

/// Characters of query text included in log lines
const LOG_PREVIEW_CHARS: usize = 100;

// ============================================================================
// Query Request
// ============================================================================

/// A query to be routed to a provider
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Query text (must be non-empty)
    pub query: String,

    /// Optional conversation context, sent as a system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Provider key the caller would like to use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,

    /// Override for the provider's default token limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Override for the provider's default temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Override for the per-attempt timeout, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl QueryRequest {
    /// Create a request for `query`
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Attach conversation context
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Ask for a specific provider
    #[must_use]
    pub fn with_preferred_provider(mut self, key: impl Into<String>) -> Self {
        self.preferred_provider = Some(key.into());
        self
    }

    /// Override the token limit
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Override the temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Override the per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Per-attempt timeout override, if any
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Reject requests that must never reach a provider
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidRequest`] for blank query text, an
    /// out-of-range temperature, or a zero token limit or timeout.
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.query.trim().is_empty() {
            return Err(RouterError::InvalidRequest(
                "query text must not be empty".to_string(),
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(RouterError::InvalidRequest(format!(
                    "temperature {t} is outside 0.0..=2.0"
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(RouterError::InvalidRequest(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(RouterError::InvalidRequest(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Query text shortened for logging
    #[must_use]
    pub fn preview(&self) -> String {
        match self.query.char_indices().nth(LOG_PREVIEW_CHARS) {
            Some((idx, _)) => format!("{}...", &self.query[..idx]),
            None => self.query.clone(),
        }
    }
}

// ============================================================================
// Query Response
// ============================================================================

/// Result of a successful routing operation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryResponse {
    /// Correlation id of the routing operation
    pub request_id: String,

    /// Generated text
    pub response: String,

    /// Key of the provider that produced the response
    pub model: String,

    /// Derived confidence in 0.0..=1.0
    pub confidence: f64,

    /// Duration of the successful attempt
    pub processing_time_ms: u64,

    /// Duration of the whole routing operation, failed attempts included
    pub total_time_ms: u64,

    /// Tokens used, if the provider reported usage
    pub tokens_used: Option<u32>,

    /// Estimated cost, if usage was reported
    pub cost: Option<f64>,

    /// Whether a fallback provider produced the response
    pub is_fallback: bool,

    /// Provider keys in the order they were attempted
    pub attempted: Vec<String>,
}
