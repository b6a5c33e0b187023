//! Provider Registry
//!
//! Catalog of reachable inference providers and their call parameters.
//! Providers are registered at startup from configuration and are read-only
//! afterwards; the registry hands out `Arc<Provider>` so adapters and the
//! selector never hold the registry lock across an await point.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::routing::RouterError;

// ============================================================================
// Provider Kind
// ============================================================================

/// Wire format family a provider speaks
///
/// Each kind maps to exactly one adapter implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat-completions API
    OpenAi,
    /// Anthropic messages API
    Anthropic,
    /// xAI Grok (OpenAI-compatible chat completions)
    Grok,
}

impl ProviderKind {
    /// Upstream model used when the configuration does not name one
    #[must_use]
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4",
            Self::Anthropic => "claude-3-sonnet-20240229",
            Self::Grok => "grok-beta",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Grok => write!(f, "grok"),
        }
    }
}

// ============================================================================
// Credential
// ============================================================================

/// API credential for a provider
///
/// The secret is never printed; `Debug` only reveals whether one is present.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(Option<String>);

impl Credential {
    /// Wrap an API key
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        if key.is_empty() {
            Self(None)
        } else {
            Self(Some(key))
        }
    }

    /// No credential configured
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Read the credential from an environment variable (empty counts as unset)
    #[must_use]
    pub fn from_env(var: &str) -> Self {
        std::env::var(var).map(Self::new).unwrap_or_default()
    }

    /// Access the secret for building request headers
    #[must_use]
    pub fn expose(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Whether a secret is configured
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_some() {
            write!(f, "Credential(<redacted>)")
        } else {
            write!(f, "Credential(<none>)")
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

/// A remote inference backend identified by a stable key
#[derive(Clone, Debug)]
pub struct Provider {
    /// Stable key used for routing (e.g. "gpt-4")
    pub key: String,

    /// Human-readable name
    pub display_name: String,

    /// Wire format family
    pub kind: ProviderKind,

    /// Upstream model identifier sent in the payload
    pub model: String,

    /// Full URL of the completion endpoint
    pub endpoint: String,

    /// API credential
    pub credential: Credential,

    /// Default maximum tokens in a response
    pub max_tokens: u32,

    /// Default sampling temperature
    pub temperature: f32,

    /// Estimated cost per token, used for cost reporting only
    pub cost_per_token: f64,
}

impl Provider {
    /// Create a provider with default limits
    pub fn new(key: impl Into<String>, kind: ProviderKind, endpoint: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            display_name: key.clone(),
            key,
            kind,
            model: kind.default_model().to_string(),
            endpoint: endpoint.into(),
            credential: Credential::none(),
            max_tokens: 4096,
            temperature: 0.7,
            cost_per_token: 0.0,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Set the upstream model identifier
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the credential
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// Set the default token limit
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the default temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set the per-token cost
    #[must_use]
    pub fn with_cost_per_token(mut self, cost: f64) -> Self {
        self.cost_per_token = cost.max(0.0);
        self
    }

    /// Estimated cost of a call that used `tokens` tokens
    #[must_use]
    pub fn estimate_cost(&self, tokens: u32) -> f64 {
        self.cost_per_token * f64::from(tokens)
    }
}

// ============================================================================
// Provider Registry
// ============================================================================

/// Ordered catalog of providers
///
/// Listing order is registration order. Re-registering a key replaces the
/// definition in place.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<Provider>>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with providers
    pub fn from_providers(providers: impl IntoIterator<Item = Provider>) -> Self {
        let registry = Self::new();
        for provider in providers {
            registry.register(provider);
        }
        registry
    }

    /// Add or replace a provider by key
    ///
    /// Returns the definition that was replaced, if any.
    pub fn register(&self, provider: Provider) -> Option<Arc<Provider>> {
        let provider = Arc::new(provider);
        let mut providers = self.providers.write();

        if let Some(slot) = providers.iter_mut().find(|p| p.key == provider.key) {
            tracing::debug!(provider = %provider.key, "Replacing provider definition");
            return Some(std::mem::replace(slot, provider));
        }

        tracing::debug!(provider = %provider.key, kind = %provider.kind, "Registered provider");
        providers.push(provider);
        None
    }

    /// Look up a provider by key
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ProviderNotFound`] when the key is not registered.
    pub fn get(&self, key: &str) -> Result<Arc<Provider>, RouterError> {
        self.providers
            .read()
            .iter()
            .find(|p| p.key == key)
            .cloned()
            .ok_or_else(|| RouterError::ProviderNotFound(key.to_string()))
    }

    /// Whether a key is registered
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.providers.read().iter().any(|p| p.key == key)
    }

    /// All providers in registration order
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Provider>> {
        self.providers.read().clone()
    }

    /// All keys in registration order
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.providers.read().iter().map(|p| p.key.clone()).collect()
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    /// Whether no providers are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(key: &str) -> Provider {
        Provider::new(key, ProviderKind::OpenAi, "http://localhost/v1/chat/completions")
    }

    #[test]
    fn test_register_and_get() {
        let registry = ProviderRegistry::new();
        assert!(registry.register(provider("gpt-4")).is_none());

        let found = registry.get("gpt-4").unwrap();
        assert_eq!(found.key, "gpt-4");
        assert_eq!(found.model, "gpt-4");
        assert!(registry.contains("gpt-4"));
    }

    #[test]
    fn test_get_missing_is_provider_not_found() {
        let registry = ProviderRegistry::new();
        match registry.get("nope") {
            Err(RouterError::ProviderNotFound(key)) => assert_eq!(key, "nope"),
            other => panic!("Expected ProviderNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_list_keeps_registration_order() {
        let registry = ProviderRegistry::from_providers(vec![
            provider("gpt-4"),
            provider("claude-3"),
            provider("grok"),
        ]);
        assert_eq!(registry.keys(), vec!["gpt-4", "claude-3", "grok"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_replace_keeps_position() {
        let registry =
            ProviderRegistry::from_providers(vec![provider("gpt-4"), provider("claude-3")]);

        let replaced = registry.register(provider("gpt-4").with_max_tokens(128));
        assert_eq!(replaced.map(|p| p.max_tokens), Some(4096));
        assert_eq!(registry.keys(), vec!["gpt-4", "claude-3"]);
        assert_eq!(registry.get("gpt-4").unwrap().max_tokens, 128);
    }

    #[test]
    fn test_credential_is_redacted() {
        let credential = Credential::new("sk-secret");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("sk-secret"));
        assert_eq!(credential.expose(), Some("sk-secret"));

        assert!(!Credential::new("").is_present());
    }

    #[test]
    fn test_estimate_cost() {
        let p = provider("gpt-4").with_cost_per_token(0.00003);
        assert!((p.estimate_cost(1000) - 0.03).abs() < 1e-12);
    }
}
