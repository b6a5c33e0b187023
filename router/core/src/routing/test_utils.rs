//! Routing Test Utilities
//!
//! A scripted adapter for exercising selection and fallback without HTTP.
//!
//! # Usage
//!
//! ```ignore
//! let adapter = ScriptedAdapter::new();
//! adapter.hang("gpt-4");
//! adapter.reply("claude-3", "answer", Some(42));
//!
//! let d = dispatcher(&["gpt-4", "claude-3"], &adapter);
//! let response = d.route(&QueryRequest::new("hi")).await?;
//! assert_eq!(adapter.calls(), vec!["gpt-4", "claude-3"]);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::dispatcher::{AdapterSet, Dispatcher};
use super::health::HealthTracker;
use super::selector::Selector;
use super::tracker::PerformanceTracker;
use super::QueryRequest;
use crate::adapter::{Completion, ProviderAdapter, ProviderCallError};
use crate::registry::{Credential, Provider, ProviderKind, ProviderRegistry};

/// Cost per token of providers built by [`provider`]
pub const TEST_COST_PER_TOKEN: f64 = 0.000_03;

// ============================================================================
// Scripted Behavior
// ============================================================================

/// What the adapter does when a provider is invoked
#[derive(Clone, Debug)]
pub enum Scripted {
    /// Reply after `delay`
    Reply {
        /// Response text
        content: String,
        /// Reported usage
        tokens: Option<u32>,
        /// Simulated latency
        delay: Duration,
    },
    /// Fail immediately
    Fail(ProviderCallError),
    /// Never answer
    Hang,
}

/// Adapter whose responses are scripted per provider key
///
/// Each key holds a queue of behaviors; the last one repeats once the queue
/// is drained. Unscripted keys fail with a network error.
#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    scripts: Mutex<HashMap<String, Vec<Scripted>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    /// Create an adapter with no scripts
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a behavior for `key`
    pub fn script(&self, key: &str, behavior: Scripted) {
        self.scripts
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(behavior);
    }

    /// Queue an immediate reply
    pub fn reply(&self, key: &str, content: &str, tokens: Option<u32>) {
        self.reply_after(key, content, tokens, Duration::ZERO);
    }

    /// Queue a delayed reply
    pub fn reply_after(&self, key: &str, content: &str, tokens: Option<u32>, delay: Duration) {
        self.script(
            key,
            Scripted::Reply {
                content: content.to_string(),
                tokens,
                delay,
            },
        );
    }

    /// Queue a failure
    pub fn fail(&self, key: &str, error: ProviderCallError) {
        self.script(key, Scripted::Fail(error));
    }

    /// Queue a call that never completes
    pub fn hang(&self, key: &str) {
        self.script(key, Scripted::Hang);
    }

    /// Provider keys in the order they were invoked
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn next_behavior(&self, key: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(key)?;
        if queue.len() > 1 {
            Some(queue.remove(0))
        } else {
            queue.first().cloned()
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn invoke(
        &self,
        provider: &Provider,
        _request: &QueryRequest,
        _timeout: Duration,
    ) -> Result<Completion, ProviderCallError> {
        self.calls.lock().push(provider.key.clone());

        match self.next_behavior(&provider.key) {
            Some(Scripted::Reply {
                content,
                tokens,
                delay,
            }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(Completion::new(content, tokens))
            }
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(ProviderCallError::network(format!(
                "no script for provider '{}'",
                provider.key
            ))),
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

/// A provider with a test credential
#[must_use]
pub fn provider(key: &str) -> Provider {
    Provider::new(key, ProviderKind::OpenAi, format!("http://127.0.0.1/{key}"))
        .with_credential(Credential::new("test-key"))
        .with_cost_per_token(TEST_COST_PER_TOKEN)
}

/// Serve every provider kind with `adapter`
#[must_use]
pub fn adapters(adapter: &Arc<ScriptedAdapter>) -> AdapterSet {
    [ProviderKind::OpenAi, ProviderKind::Anthropic, ProviderKind::Grok]
        .into_iter()
        .map(|kind| (kind, Arc::clone(adapter) as Arc<dyn ProviderAdapter>))
        .collect()
}

/// A selector over fresh state with `keys` as the fallback order
#[must_use]
pub fn selector(keys: &[&str]) -> Selector {
    let registry = ProviderRegistry::from_providers(keys.iter().map(|k| provider(k)));
    Selector::new(
        Arc::new(registry),
        Arc::new(PerformanceTracker::new()),
        Arc::new(HealthTracker::default()),
        keys.iter().map(ToString::to_string).collect(),
    )
    .expect("test fallback order is valid")
}

/// A dispatcher over fresh state with `keys` as the fallback order
#[must_use]
pub fn dispatcher(keys: &[&str], adapter: &Arc<ScriptedAdapter>) -> Dispatcher {
    Dispatcher::new(Arc::new(selector(keys)), adapters(adapter))
}
