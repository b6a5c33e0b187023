//! Anthropic Adapter
//!
//! Messages API wire format:
//!
//! ```text
//! POST {endpoint}
//! x-api-key: <key>
//! anthropic-version: 2023-06-01
//! { "model", "max_tokens", "messages": [{role, content}], "system"?, "temperature" }
//!
//! 200 { "content": [{ "type": "text", "text" }], "usage": { "input_tokens", "output_tokens" } }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::{
    effective_max_tokens, effective_temperature, post_json, Completion, ProviderAdapter,
    ProviderCallError,
};
use crate::registry::{Provider, ProviderKind};
use crate::routing::QueryRequest;

/// API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic rejects temperatures above 1.0
const MAX_TEMPERATURE: f32 = 1.0;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl MessagesResponse {
    fn into_completion(self) -> Result<Completion, ProviderCallError> {
        let text: Vec<String> = self
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect();

        if text.is_empty() {
            return Err(ProviderCallError::malformed(
                "response contained no text content",
            ));
        }

        let tokens_used = self
            .usage
            .map(|u| u.input_tokens.saturating_add(u.output_tokens));

        Ok(Completion::new(text.concat(), tokens_used))
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapter for the Anthropic messages API
pub struct AnthropicAdapter {
    client: reqwest::Client,
}

impl AnthropicAdapter {
    /// Create an adapter sharing `client`
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_payload<'a>(provider: &'a Provider, request: &'a QueryRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &provider.model,
            max_tokens: effective_max_tokens(provider, request),
            messages: vec![Message {
                role: "user",
                content: &request.query,
            }],
            system: request.context.as_deref(),
            temperature: effective_temperature(provider, request).min(MAX_TEMPERATURE),
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn invoke(
        &self,
        provider: &Provider,
        request: &QueryRequest,
        timeout: Duration,
    ) -> Result<Completion, ProviderCallError> {
        let api_key = provider
            .credential
            .expose()
            .ok_or_else(|| ProviderCallError::missing_credential(&provider.key))?;

        let builder = self
            .client
            .post(&provider.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let payload = Self::build_payload(provider, request);

        let response: MessagesResponse = post_json(builder, &payload, timeout).await?;
        response.into_completion()
    }
}
