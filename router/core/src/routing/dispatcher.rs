//! Dispatcher / Fallback Executor
//!
//! Runs one routing operation: attempt the selected provider, and on failure
//! walk the fallback order until a provider answers or every candidate has
//! been tried.
//!
//! # State Machine
//!
//! ```text
//! Selecting --> Attempting --+--> Succeeded
//!                   ^        |
//!                   |  fail  |
//!                   +--------+--> Exhausted (no untried provider left)
//! ```
//!
//! Attempts for one request are strictly sequential and never repeat a
//! provider. Each attempt is recorded in the performance tracker and the
//! health gate once it completes; an attempt interrupted by dropping the
//! `route` future is not recorded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;
use uuid::Uuid;

use super::error::AttemptFailure;
use super::health::HealthTracker;
use super::metrics::RouterMetrics;
use super::selector::Selector;
use super::tracker::{Observation, PerformanceTracker};
use super::{QueryRequest, QueryResponse, RouterError};
use crate::adapter::{Completion, ProviderAdapter, ProviderCallError};
use crate::registry::{ProviderKind, ProviderRegistry};

/// Per-attempt timeout when neither request nor configuration sets one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const LENGTH_WEIGHT: f64 = 0.6;
const SPEED_WEIGHT: f64 = 0.4;
const FULL_LENGTH_CHARS: f64 = 1000.0;
const ZERO_SPEED_MS: f64 = 10_000.0;

/// Confidence of a successful response from its length and latency
///
/// Both terms are clamped to 0.0..=1.0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn response_confidence(content: &str, elapsed_ms: u64) -> f64 {
    let length = (content.chars().count() as f64 / FULL_LENGTH_CHARS).min(1.0);
    let speed = (1.0 - elapsed_ms as f64 / ZERO_SPEED_MS).max(0.0);
    LENGTH_WEIGHT * length + SPEED_WEIGHT * speed
}

/// Adapters keyed by the provider kind they serve
pub type AdapterSet = HashMap<ProviderKind, Arc<dyn ProviderAdapter>>;

// ============================================================================
// Attempt Outcome
// ============================================================================

/// Result of one provider attempt, consumed by the fallback loop
#[derive(Debug)]
enum AttemptOutcome {
    Succeeded {
        completion: Completion,
        cost: Option<f64>,
        confidence: f64,
    },
    Failed(ProviderCallError),
}

struct Attempt {
    elapsed_ms: u64,
    outcome: AttemptOutcome,
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Executes routing operations against the configured providers
pub struct Dispatcher {
    selector: Arc<Selector>,
    adapters: AdapterSet,
    metrics: Arc<RouterMetrics>,
    default_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher using `selector` for choices and `adapters` for calls
    #[must_use]
    pub fn new(selector: Arc<Selector>, adapters: AdapterSet) -> Self {
        Self {
            selector,
            adapters,
            metrics: Arc::new(RouterMetrics::new()),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Share a metrics instance
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<RouterMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the per-attempt timeout used when a request has no override
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Metrics updated by this dispatcher
    #[must_use]
    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }

    fn registry(&self) -> &ProviderRegistry {
        self.selector.registry()
    }

    fn tracker(&self) -> &PerformanceTracker {
        self.selector.tracker()
    }

    fn health(&self) -> &HealthTracker {
        self.selector.health()
    }

    /// Route `request` to the best available provider, falling back on failure
    ///
    /// # Errors
    ///
    /// - [`RouterError::InvalidRequest`] when the request fails validation; no
    ///   provider is contacted
    /// - [`RouterError::AllProvidersExhausted`] when every candidate failed
    pub async fn route(&self, request: &QueryRequest) -> Result<QueryResponse, RouterError> {
        if let Err(e) = request.validate() {
            self.metrics.invalid_requests.inc();
            tracing::warn!(error = %e, "Rejected request");
            return Err(e);
        }

        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("route", request_id = %request_id);
        self.run(request, request_id).instrument(span).await
    }

    async fn run(
        &self,
        request: &QueryRequest,
        request_id: String,
    ) -> Result<QueryResponse, RouterError> {
        let started = Instant::now();
        let timeout = request.timeout().unwrap_or(self.default_timeout);
        self.metrics.routes_total.inc();

        let selection = self.selector.select_primary(request);
        tracing::info!(
            provider = %selection.key,
            reason = ?selection.reason,
            query = %request.preview(),
            "Routing query"
        );

        let first = selection.key;
        let mut candidate = Some(first.clone());
        let mut tried: Vec<String> = Vec::new();
        let mut failures: Vec<AttemptFailure> = Vec::new();

        while let Some(key) = candidate {
            let attempt = self.attempt(&key, request, timeout).await;
            tried.push(key.clone());

            match attempt.outcome {
                AttemptOutcome::Succeeded {
                    completion,
                    cost,
                    confidence,
                } => {
                    let is_fallback = key != first;
                    let total_time_ms = elapsed_ms(started);

                    self.metrics.routes_succeeded.inc();
                    self.metrics.route_latency.record(total_time_ms);
                    if is_fallback {
                        self.metrics.routes_fallback.inc();
                        tracing::info!(
                            provider = %key,
                            failed = failures.len(),
                            "Fallback provider succeeded"
                        );
                    }
                    tracing::info!(
                        provider = %key,
                        elapsed_ms = attempt.elapsed_ms,
                        confidence,
                        tokens = ?completion.tokens_used,
                        "Query routed"
                    );

                    return Ok(QueryResponse {
                        request_id,
                        response: completion.content,
                        model: key,
                        confidence,
                        processing_time_ms: attempt.elapsed_ms,
                        total_time_ms,
                        tokens_used: completion.tokens_used,
                        cost,
                        is_fallback,
                        attempted: tried,
                    });
                }
                AttemptOutcome::Failed(error) => {
                    tracing::warn!(
                        provider = %key,
                        elapsed_ms = attempt.elapsed_ms,
                        error = %error,
                        "Provider attempt failed"
                    );
                    failures.push(AttemptFailure {
                        provider: key,
                        error,
                        elapsed_ms: attempt.elapsed_ms,
                    });

                    candidate = self.selector.next_fallback(&tried);
                    if let Some(next) = &candidate {
                        tracing::info!(provider = %next, "Falling back");
                    }
                }
            }
        }

        self.metrics.routes_exhausted.inc();
        tracing::warn!(
            attempts = failures.len(),
            total_ms = elapsed_ms(started),
            "All providers exhausted"
        );
        Err(RouterError::AllProvidersExhausted { attempts: failures })
    }

    /// Invoke one provider and record the completed outcome
    async fn attempt(&self, key: &str, request: &QueryRequest, timeout: Duration) -> Attempt {
        let started = Instant::now();
        self.metrics.provider_attempts.inc();

        let result = self.call(key, request, timeout).await;
        let elapsed_ms = elapsed_ms(started);

        let outcome = match result {
            Ok((completion, cost)) => AttemptOutcome::Succeeded {
                confidence: response_confidence(&completion.content, elapsed_ms),
                completion,
                cost,
            },
            Err(error) => AttemptOutcome::Failed(error),
        };

        match &outcome {
            AttemptOutcome::Succeeded {
                completion,
                cost,
                confidence,
            } => {
                self.tracker().observe(
                    key,
                    Observation::success(elapsed_ms, *confidence)
                        .with_usage(completion.tokens_used, cost.unwrap_or_default()),
                );
                self.health().record_success(key);
            }
            AttemptOutcome::Failed(_) => {
                self.metrics.provider_failures.inc();
                self.tracker().observe(key, Observation::failure(elapsed_ms));
                self.health().record_failure(key);
            }
        }

        Attempt { elapsed_ms, outcome }
    }

    async fn call(
        &self,
        key: &str,
        request: &QueryRequest,
        timeout: Duration,
    ) -> Result<(Completion, Option<f64>), ProviderCallError> {
        let provider = self
            .registry()
            .get(key)
            .map_err(|e| ProviderCallError::network(e.to_string()))?;
        let adapter = self.adapters.get(&provider.kind).ok_or_else(|| {
            ProviderCallError::network(format!("no adapter for provider kind '{}'", provider.kind))
        })?;

        let completion = tokio::time::timeout(timeout, adapter.invoke(&provider, request, timeout))
            .await
            .map_err(|_| ProviderCallError::timeout(timeout))??;

        let cost = completion.tokens_used.map(|t| provider.estimate_cost(t));
        Ok((completion, cost))
    }
}
