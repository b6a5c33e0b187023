//! Provider Selection
//!
//! Picks the primary provider for a request and supplies the fallback
//! sequence when attempts fail.
//!
//! # Scoring
//!
//! ```text
//! score = 0.5 * success_rate
//!       + 0.3 * avg_confidence
//!       + 0.2 * (1 / max(avg_latency_ms, 100))
//! ```
//!
//! The 100ms floor keeps an untested provider (latency 0) from dominating on
//! the reciprocal term. Ties go to the provider earlier in the fallback order.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::health::HealthTracker;
use super::tracker::{PerformanceProfile, PerformanceTracker};
use super::{QueryRequest, RouterError};
use crate::registry::ProviderRegistry;

const SUCCESS_WEIGHT: f64 = 0.5;
const CONFIDENCE_WEIGHT: f64 = 0.3;
const LATENCY_WEIGHT: f64 = 0.2;
const LATENCY_FLOOR_MS: f64 = 100.0;

/// Composite score of a performance profile
#[must_use]
pub fn composite_score(profile: &PerformanceProfile) -> f64 {
    SUCCESS_WEIGHT * profile.success_rate
        + CONFIDENCE_WEIGHT * profile.avg_confidence
        + LATENCY_WEIGHT * (1.0 / profile.avg_latency_ms.max(LATENCY_FLOOR_MS))
}

// ============================================================================
// Selection
// ============================================================================

/// Why a provider was chosen
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SelectionReason {
    /// The caller asked for it and it was available
    Preferred,
    /// Highest composite score
    BestScore {
        /// Winning score
        score: f64,
    },
}

/// The primary provider for a request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Selection {
    /// Provider key
    pub key: String,
    /// How it was chosen
    #[serde(flatten)]
    pub reason: SelectionReason,
}

/// A fallback-order entry with its current score
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedProvider {
    /// Provider key
    pub key: String,
    /// Composite score
    pub score: f64,
    /// Whether the health gate allows selection
    pub available: bool,
}

// ============================================================================
// Selector
// ============================================================================

/// Chooses providers from live performance and health
#[derive(Debug)]
pub struct Selector {
    registry: Arc<ProviderRegistry>,
    tracker: Arc<PerformanceTracker>,
    health: Arc<HealthTracker>,
    fallback_order: Vec<String>,
}

impl Selector {
    /// Create a selector over `fallback_order`
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Configuration`] when the order is empty, repeats
    /// a key, or names a key that is not registered.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        tracker: Arc<PerformanceTracker>,
        health: Arc<HealthTracker>,
        fallback_order: Vec<String>,
    ) -> Result<Self, RouterError> {
        if fallback_order.is_empty() {
            return Err(RouterError::Configuration(
                "fallback order must name at least one provider".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for key in &fallback_order {
            if !seen.insert(key.as_str()) {
                return Err(RouterError::Configuration(format!(
                    "provider '{key}' appears twice in the fallback order"
                )));
            }
            if !registry.contains(key) {
                return Err(RouterError::Configuration(format!(
                    "fallback order names unregistered provider '{key}'"
                )));
            }
        }

        Ok(Self {
            registry,
            tracker,
            health,
            fallback_order,
        })
    }

    /// The configured fallback order
    #[must_use]
    pub fn fallback_order(&self) -> &[String] {
        &self.fallback_order
    }

    /// Registry the selector validates against
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Tracker the selector scores from
    #[must_use]
    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// Health gate the selector consults
    #[must_use]
    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Choose the first provider to attempt
    ///
    /// A registered, available preferred provider always wins. Otherwise the
    /// best-scoring available provider in the fallback order is chosen; when
    /// none is available, every provider competes.
    #[must_use]
    pub fn select_primary(&self, request: &QueryRequest) -> Selection {
        if let Some(preferred) = request.preferred_provider.as_deref() {
            match self.registry.get(preferred) {
                Ok(_) if self.health.is_available(preferred) => {
                    tracing::debug!(provider = %preferred, "Using preferred provider");
                    return Selection {
                        key: preferred.to_string(),
                        reason: SelectionReason::Preferred,
                    };
                }
                Ok(_) => {
                    tracing::info!(provider = %preferred, "Preferred provider unhealthy, scoring instead");
                }
                Err(e) => {
                    tracing::info!(error = %e, "Preferred provider ignored");
                }
            }
        }

        let ranked = self.ranked();
        let any_available = ranked.iter().any(|r| r.available);

        let mut best: Option<&RankedProvider> = None;
        for candidate in ranked.iter().filter(|r| r.available || !any_available) {
            if best.map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }

        // `new` rejects an empty order, so `ranked` always has an entry.
        let (key, score) = best
            .or_else(|| ranked.first())
            .map_or_else(|| (String::new(), 0.0), |b| (b.key.clone(), b.score));

        tracing::debug!(provider = %key, score, "Selected best-scoring provider");
        Selection {
            key,
            reason: SelectionReason::BestScore { score },
        }
    }

    /// First provider in the fallback order not yet tried
    #[must_use]
    pub fn next_fallback(&self, tried: &[String]) -> Option<String> {
        self.fallback_order
            .iter()
            .find(|key| !tried.contains(key))
            .cloned()
    }

    /// Every fallback-order provider with its score, in fallback order
    #[must_use]
    pub fn ranked(&self) -> Vec<RankedProvider> {
        self.fallback_order
            .iter()
            .map(|key| RankedProvider {
                key: key.clone(),
                score: composite_score(&self.tracker.snapshot(key)),
                available: self.health.is_available(key),
            })
            .collect()
    }
}
