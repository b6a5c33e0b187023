//! Grok Adapter
//!
//! xAI exposes an OpenAI-compatible chat-completions endpoint, so the payload
//! and response shapes are borrowed from the OpenAI adapter. Temperature is
//! passed through uncapped (0.0..=2.0).

use std::time::Duration;

use async_trait::async_trait;

use super::openai::{chat_messages, ChatCompletionRequest, ChatCompletionResponse};
use super::traits::{
    effective_max_tokens, effective_temperature, post_json, Completion, ProviderAdapter,
    ProviderCallError,
};
use crate::registry::{Provider, ProviderKind};
use crate::routing::QueryRequest;

/// Adapter for xAI Grok
pub struct GrokAdapter {
    client: reqwest::Client,
}

impl GrokAdapter {
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
impl ProviderAdapter for GrokAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Grok
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
