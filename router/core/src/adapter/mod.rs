//! Provider Adapters
//!
//! Each provider kind has one adapter that owns its wire format. The
//! dispatcher holds adapters behind the [`ProviderAdapter`] trait and never
//! branches on provider identity.
//!
//! # Available Adapters
//!
//! - **OpenAI**: chat completions, bearer auth
//! - **Anthropic**: messages API, `x-api-key` auth
//! - **Grok**: OpenAI-compatible chat completions
//!
//! # Usage
//!
//! ```ignore
//! use router_core::adapter::create_adapter;
//! use router_core::registry::ProviderKind;
//!
//! let adapter = create_adapter(ProviderKind::OpenAi, reqwest::Client::new());
//! let completion = adapter.invoke(&provider, &request, timeout).await?;
//! ```

mod anthropic;
mod grok;
mod openai;
mod traits;

use std::sync::Arc;

pub use anthropic::{AnthropicAdapter, ANTHROPIC_VERSION};
pub use grok::GrokAdapter;
pub use openai::OpenAiAdapter;
pub use traits::{CallErrorKind, Completion, ProviderAdapter, ProviderCallError};

use crate::registry::ProviderKind;

/// Create the adapter for a provider kind
///
/// All adapters share `client`, and with it the connection pool.
#[must_use]
pub fn create_adapter(kind: ProviderKind, client: reqwest::Client) -> Arc<dyn ProviderAdapter> {
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiAdapter::new(client)),
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(client)),
        ProviderKind::Grok => Arc::new(GrokAdapter::new(client)),
    }
}
