//! OpenAI Adapter
//!
//! Chat-completions wire format:
//!
//! ```text
//! POST {endpoint}
//! Authorization: Bearer <key>
//! { "model", "messages": [{role, content}], "max_tokens", "temperature" }
//!
//! 200 { "choices": [{ "message": { "content" } }], "usage": { "total_tokens" } }
//! ```
//!
//! The response types are shared with the Grok adapter, which speaks the same
//! dialect.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::{
    effective_max_tokens, effective_temperature, post_json, Completion, ProviderAdapter,
    ProviderCallError,
};
use crate::registry::{Provider, ProviderKind};
use crate::routing::QueryRequest;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
pub(super) struct ChatMessage<'a> {
    pub(super) role: &'static str,
    pub(super) content: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct ChatCompletionRequest<'a> {
    pub(super) model: &'a str,
    pub(super) messages: Vec<ChatMessage<'a>>,
    pub(super) max_tokens: u32,
    pub(super) temperature: f32,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    /// Legacy completions shape
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

/// Messages in chat order: context as system prompt, then the user query
pub(super) fn chat_messages(request: &QueryRequest) -> Vec<ChatMessage<'_>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(context) = request.context.as_deref() {
        messages.push(ChatMessage {
            role: "system",
            content: context,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.query,
    });
    messages
}

impl ChatCompletionResponse {
    /// Pull the first choice's text and the reported usage
    pub(super) fn into_completion(self) -> Result<Completion, ProviderCallError> {
        let tokens_used = self.usage.and_then(|u| u.total_tokens);
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderCallError::malformed("response contained no choices"))?;

        let content = choice
            .message
            .and_then(|m| m.content)
            .or(choice.text)
            .ok_or_else(|| ProviderCallError::malformed("first choice has no content"))?;

        Ok(Completion::new(content, tokens_used))
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Adapter for the OpenAI chat-completions API
pub struct OpenAiAdapter {
    client: reqwest::Client,
}

impl OpenAiAdapter {
    /// Create an adapter sharing `client`
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_payload<'a>(
        provider: &'a Provider,
        request: &'a QueryRequest,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &provider.model,
            messages: chat_messages(request),
            max_tokens: effective_max_tokens(provider, request),
            temperature: effective_temperature(provider, request),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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

        let builder = self.client.post(&provider.endpoint).bearer_auth(api_key);
        let payload = Self::build_payload(provider, request);

        let response: ChatCompletionResponse = post_json(builder, &payload, timeout).await?;
        response.into_completion()
    }
}
