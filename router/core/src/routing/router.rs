//! MetaRouter
//!
//! The host-facing entry point. Wires registry, tracker, health gate,
//! selector and dispatcher together and exposes the three operations a
//! service layer needs:
//!
//! - [`MetaRouter::route`] for "submit query"
//! - [`MetaRouter::performance_metrics`] for a metrics/status endpoint
//! - [`MetaRouter::health_status`] for liveness/readiness probes

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use super::dispatcher::{AdapterSet, Dispatcher, DEFAULT_TIMEOUT};
use super::health::{HealthConfig, HealthState, HealthTracker};
use super::metrics::{RouterMetrics, RouterMetricsSnapshot};
use super::selector::{RankedProvider, Selector};
use super::tracker::{PerformanceProfile, PerformanceTracker, RecentStats, RECENT_WINDOW};
use super::{QueryRequest, QueryResponse, RouterError};
use crate::adapter::{create_adapter, ProviderCallError};
use crate::config::RouterConfig;
use crate::registry::{ProviderKind, ProviderRegistry};

/// Query sent by active health probes
const PROBE_QUERY: &str = "Hello";

/// Token limit for active health probes
const PROBE_MAX_TOKENS: u32 = 16;

// ============================================================================
// Options
// ============================================================================

/// Runtime knobs for a [`MetaRouter`]
#[derive(Clone, Debug)]
pub struct RouterOptions {
    /// Per-attempt timeout when a request has no override
    pub default_timeout: Duration,

    /// Timeout for each active health probe
    pub probe_timeout: Duration,

    /// Health gate thresholds
    pub health: HealthConfig,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            probe_timeout: Duration::from_secs(10),
            health: HealthConfig::default(),
        }
    }
}

// ============================================================================
// Health Report
// ============================================================================

/// Aggregate availability
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    /// Every provider is available
    Healthy,
    /// Some providers are available
    Degraded,
    /// No provider is available
    Unhealthy,
}

/// Availability of one provider
#[derive(Clone, Debug, Serialize)]
pub struct ProviderAvailability {
    /// Provider key
    pub key: String,
    /// Display name
    pub name: String,
    /// Whether the provider may be selected
    pub available: bool,
    /// Health gate state
    pub health: HealthState,
    /// Consecutive failures since the last success
    pub consecutive_failures: u32,
    /// Current performance profile
    pub profile: PerformanceProfile,
    /// Attempts within the recent window
    pub recent: RecentStats,
}

/// Result of [`MetaRouter::health_status`]
#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    /// Aggregate status
    pub status: OverallHealth,
    /// Per-provider availability in registry order
    pub providers: Vec<ProviderAvailability>,
    /// When the report was built
    pub checked_at: DateTime<Utc>,
}

/// Outcome of one active probe
#[derive(Clone, Debug, Serialize)]
pub struct ProbeResult {
    /// Provider key
    pub key: String,
    /// Whether the provider answered
    pub healthy: bool,
    /// Probe duration
    pub elapsed_ms: u64,
    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// MetaRouter
// ============================================================================

/// Adaptive router over a fixed set of providers
pub struct MetaRouter {
    selector: Arc<Selector>,
    dispatcher: Dispatcher,
    adapters: AdapterSet,
    metrics: Arc<RouterMetrics>,
    options: RouterOptions,
}

impl MetaRouter {
    /// Build a router from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Configuration`] when the fallback order is
    /// invalid or the HTTP client cannot be created.
    pub fn from_config(config: &RouterConfig) -> Result<Self, RouterError> {
        let registry = config.build_registry();
        let router = Self::new(
            registry,
            config.routing.fallback_order.clone(),
            config.router_options(),
        )?;

        tracing::info!(
            providers = router.registry().len(),
            fallback_order = ?router.selector.fallback_order(),
            source = ?config.source,
            "Router initialized"
        );
        Ok(router)
    }

    /// Build a router with HTTP adapters sharing one client
    ///
    /// # Errors
    ///
    /// See [`MetaRouter::from_config`].
    pub fn new(
        registry: ProviderRegistry,
        fallback_order: Vec<String>,
        options: RouterOptions,
    ) -> Result<Self, RouterError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| RouterError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let adapters = [ProviderKind::OpenAi, ProviderKind::Anthropic, ProviderKind::Grok]
            .into_iter()
            .map(|kind| (kind, create_adapter(kind, client.clone())))
            .collect();

        Self::with_adapters(registry, fallback_order, options, adapters)
    }

    /// Build a router with caller-supplied adapters
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Configuration`] when the fallback order is
    /// invalid.
    pub fn with_adapters(
        registry: ProviderRegistry,
        fallback_order: Vec<String>,
        options: RouterOptions,
        adapters: AdapterSet,
    ) -> Result<Self, RouterError> {
        let selector = Arc::new(Selector::new(
            Arc::new(registry),
            Arc::new(PerformanceTracker::new()),
            Arc::new(HealthTracker::new(options.health.clone())),
            fallback_order,
        )?);
        let metrics = Arc::new(RouterMetrics::new());
        let dispatcher = Dispatcher::new(Arc::clone(&selector), adapters.clone())
            .with_metrics(Arc::clone(&metrics))
            .with_default_timeout(options.default_timeout);

        Ok(Self {
            selector,
            dispatcher,
            adapters,
            metrics,
            options,
        })
    }

    /// Provider catalog
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        self.selector.registry()
    }

    /// Per-provider performance store
    #[must_use]
    pub fn tracker(&self) -> &PerformanceTracker {
        self.selector.tracker()
    }

    /// Per-provider health gate
    #[must_use]
    pub fn health(&self) -> &HealthTracker {
        self.selector.health()
    }

    /// Configured fallback order
    #[must_use]
    pub fn fallback_order(&self) -> &[String] {
        self.selector.fallback_order()
    }

    /// Route a query
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::route`].
    pub async fn route(&self, request: &QueryRequest) -> Result<QueryResponse, RouterError> {
        self.dispatcher.route(request).await
    }

    /// One profile per registered provider, in registry order
    #[must_use]
    pub fn performance_metrics(&self) -> Vec<PerformanceProfile> {
        self.registry()
            .keys()
            .iter()
            .map(|key| self.tracker().snapshot(key))
            .collect()
    }

    /// Per-provider summary of attempts within `window`, in registry order
    ///
    /// Only the most recent attempts are kept, so a long window may cover
    /// fewer attempts than the all-time profiles.
    #[must_use]
    pub fn recent_metrics(&self, window: Duration) -> Vec<RecentStats> {
        self.tracker().recent_stats(&self.registry().keys(), window)
    }

    /// Current fallback-order scores
    #[must_use]
    pub fn rankings(&self) -> Vec<RankedProvider> {
        self.selector.ranked()
    }

    /// Availability of every provider and the aggregate status
    #[must_use]
    pub fn health_status(&self) -> HealthReport {
        let recent = self.tracker().recent(RECENT_WINDOW);
        let providers: Vec<ProviderAvailability> = self
            .registry()
            .list()
            .iter()
            .map(|provider| {
                let health = self.health().status(&provider.key);
                ProviderAvailability {
                    key: provider.key.clone(),
                    name: provider.display_name.clone(),
                    available: health.is_available(),
                    health,
                    consecutive_failures: self.health().consecutive_failures(&provider.key),
                    profile: self.tracker().snapshot(&provider.key),
                    recent: RecentStats::summarize(&provider.key, RECENT_WINDOW, &recent),
                }
            })
            .collect();

        let available = providers.iter().filter(|p| p.available).count();
        let status = if available == providers.len() && available > 0 {
            OverallHealth::Healthy
        } else if available > 0 {
            OverallHealth::Degraded
        } else {
            OverallHealth::Unhealthy
        };

        HealthReport {
            status,
            providers,
            checked_at: Utc::now(),
        }
    }

    /// Routing counters
    #[must_use]
    pub fn router_metrics(&self) -> RouterMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Send a short query to every provider and update the health gate
    ///
    /// Probes do not touch performance profiles.
    pub async fn probe_providers(&self) -> Vec<ProbeResult> {
        let probe = QueryRequest::new(PROBE_QUERY).with_max_tokens(PROBE_MAX_TOKENS);
        let timeout = self.options.probe_timeout;
        let mut results = Vec::new();

        for provider in self.registry().list() {
            let started = Instant::now();
            let outcome = match self.adapters.get(&provider.kind) {
                Some(adapter) => {
                    tokio::time::timeout(timeout, adapter.invoke(&provider, &probe, timeout))
                        .await
                        .unwrap_or_else(|_| Err(ProviderCallError::timeout(timeout)))
                }
                None => Err(ProviderCallError::network(format!(
                    "no adapter for provider kind '{}'",
                    provider.kind
                ))),
            };
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let healthy = outcome.is_ok();
            self.health().mark(&provider.key, healthy);
            let error = outcome.err().map(|e| e.to_string());
            if let Some(error) = &error {
                tracing::warn!(provider = %provider.key, error = %error, "Health probe failed");
            } else {
                tracing::debug!(provider = %provider.key, elapsed_ms, "Health probe passed");
            }

            results.push(ProbeResult {
                key: provider.key.clone(),
                healthy,
                elapsed_ms,
                error,
            });
        }

        results
    }

    /// Probe every `interval` in a background task
    ///
    /// Returns `None` when `interval` is zero. The task ends once the router
    /// is dropped.
    pub fn spawn_health_checker(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            tracing::debug!("Periodic health checks disabled");
            return None;
        }

        let router: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                let Some(router) = router.upgrade() else {
                    break;
                };
                let results = router.probe_providers().await;
                let healthy = results.iter().filter(|r| r.healthy).count();
                tracing::info!(healthy, total = results.len(), "Health check complete");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::test_utils::{adapters, provider, ScriptedAdapter};

    fn router(keys: &[&str], adapter: &Arc<ScriptedAdapter>) -> MetaRouter {
        MetaRouter::with_adapters(
            ProviderRegistry::from_providers(keys.iter().map(|k| provider(k))),
            keys.iter().map(ToString::to_string).collect(),
            RouterOptions {
                probe_timeout: Duration::from_millis(50),
                ..RouterOptions::default()
            },
            adapters(adapter),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_performance_metrics_in_registry_order() {
        let adapter = ScriptedAdapter::new();
        adapter.reply("gpt-4", "hello", None);
        let r = router(&["gpt-4", "claude-3", "grok"], &adapter);

        r.route(&QueryRequest::new("hi")).await.unwrap();

        let metrics = r.performance_metrics();
        let keys: Vec<&str> = metrics.iter().map(|p| p.provider.as_str()).collect();
        assert_eq!(keys, vec!["gpt-4", "claude-3", "grok"]);
        assert_eq!(metrics[0].total_requests, 1);
        assert_eq!(metrics[1].total_requests, 0);
        assert_eq!(r.router_metrics().routes_succeeded, 1);
    }

    #[test]
    fn test_health_status_aggregates() {
        let adapter = ScriptedAdapter::new();
        let r = router(&["gpt-4", "claude-3"], &adapter);
        assert_eq!(r.health_status().status, OverallHealth::Healthy);

        r.health().mark("gpt-4", false);
        let report = r.health_status();
        assert_eq!(report.status, OverallHealth::Degraded);
        assert!(!report.providers[0].available);
        assert_eq!(report.providers[0].health, HealthState::Unhealthy);
        assert!(report.providers[1].available);

        r.health().mark("claude-3", false);
        assert_eq!(r.health_status().status, OverallHealth::Unhealthy);
    }

    #[tokio::test]
    async fn test_recent_window_in_health_report() {
        let adapter = ScriptedAdapter::new();
        adapter.fail("gpt-4", ProviderCallError::status(500, "boom"));
        adapter.reply("claude-3", "fine", Some(10));
        let r = router(&["gpt-4", "claude-3"], &adapter);

        r.route(&QueryRequest::new("one")).await.unwrap();
        r.route(&QueryRequest::new("two")).await.unwrap();

        let report = r.health_status();
        let gpt = &report.providers[0].recent;
        assert_eq!(gpt.attempts, 1);
        assert_eq!(gpt.success_rate, Some(0.0));
        let claude = &report.providers[1].recent;
        assert_eq!(claude.attempts, 2);
        assert_eq!(claude.success_rate, Some(1.0));
        assert_eq!(claude.total_tokens, 20);

        let recent = r.recent_metrics(Duration::from_secs(60));
        let keys: Vec<&str> = recent.iter().map(|s| s.provider.as_str()).collect();
        assert_eq!(keys, vec!["gpt-4", "claude-3"]);
        assert_eq!(recent[1].window_secs, 60);
    }

    #[tokio::test]
    async fn test_probe_marks_health_without_touching_profiles() {
        let adapter = ScriptedAdapter::new();
        adapter.reply("gpt-4", "hi", None);
        adapter.hang("claude-3");
        let r = router(&["gpt-4", "claude-3"], &adapter);

        let results = r.probe_providers().await;
        assert!(results[0].healthy);
        assert!(!results[1].healthy);
        assert!(results[1].error.as_deref().unwrap_or_default().contains("timeout"));

        assert_eq!(r.health().status("claude-3"), HealthState::Unhealthy);
        assert_eq!(r.tracker().snapshot("gpt-4").total_requests, 0);
        assert_eq!(r.tracker().snapshot("claude-3").total_requests, 0);
    }

    #[tokio::test]
    async fn test_health_checker_disabled_at_zero() {
        let r = Arc::new(router(&["gpt-4"], &ScriptedAdapter::new()));
        assert!(r.spawn_health_checker(Duration::ZERO).is_none());
    }

    #[tokio::test]
    async fn test_health_checker_probes_periodically() {
        let adapter = ScriptedAdapter::new();
        adapter.fail("gpt-4", ProviderCallError::status(503, "down"));
        let r = Arc::new(router(&["gpt-4"], &adapter));

        let handle = r.spawn_health_checker(Duration::from_millis(20)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(!adapter.calls().is_empty());
        assert_eq!(r.health().status("gpt-4"), HealthState::Unhealthy);
    }

    #[test]
    fn test_unregistered_fallback_key_rejected() {
        let result = MetaRouter::with_adapters(
            ProviderRegistry::from_providers(vec![provider("gpt-4")]),
            vec!["gpt-4".to_string(), "claude-3".to_string()],
            RouterOptions::default(),
            adapters(&ScriptedAdapter::new()),
        );
        assert!(matches!(result, Err(RouterError::Configuration(_))));
    }
}
