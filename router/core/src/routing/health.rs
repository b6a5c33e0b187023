//! Provider Health Tracking
//!
//! Availability gate derived from consecutive failures, in the shape of a
//! circuit breaker:
//!
//! ```text
//! +---------+   failure_threshold   +-----------+   recovery_timeout   +------------+
//! | Healthy | --------------------> | Unhealthy | -------------------> | Recovering |
//! +---------+   consecutive fails   +-----------+                      +------------+
//!      ^                                  ^                                  |
//!      |          any success             |          next failure            |
//!      +----------------------------------+----------------------------------+
//! ```
//!
//! - **Healthy**: selectable
//! - **Unhealthy**: skipped by preference, still reachable as a fallback
//! - **Recovering**: selectable again; one more failure reopens it
//!
//! Health is fed by routed attempts and by active probes (see
//! `MetaRouter::probe_providers`). State is per-provider atomics in a
//! `DashMap`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

// ============================================================================
// Health State
// ============================================================================

/// Availability of a provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Accepting requests
    #[default]
    Healthy,

    /// Recovery timeout elapsed; accepting requests on probation
    Recovering,

    /// Too many consecutive failures
    Unhealthy,
}

impl HealthState {
    /// Whether the provider may be selected
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Healthy | Self::Recovering)
    }
}

// ============================================================================
// Health Configuration
// ============================================================================

/// Thresholds for the health gate
#[derive(Clone, Debug)]
pub struct HealthConfig {
    /// Consecutive failures before a provider becomes unhealthy
    pub failure_threshold: u32,

    /// How long an unhealthy provider stays unavailable
    pub recovery_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// Provider Health
// ============================================================================

#[derive(Debug, Default)]
struct ProviderHealth {
    consecutive_failures: AtomicU32,
    /// Set once the failure threshold is crossed
    tripped: AtomicBool,
    /// Millis since tracker start of the most recent failure while tripped
    tripped_at_ms: AtomicU64,
}

// ============================================================================
// Health Tracker
// ============================================================================

/// Per-provider health gate
#[derive(Debug)]
pub struct HealthTracker {
    config: HealthConfig,
    providers: DashMap<String, Arc<ProviderHealth>>,
    started: Instant,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

impl HealthTracker {
    /// Create a tracker with the given thresholds
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            providers: DashMap::new(),
            started: Instant::now(),
        }
    }

    /// Thresholds in effect
    #[must_use]
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn entry(&self, key: &str) -> Arc<ProviderHealth> {
        if let Some(existing) = self.providers.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.providers.entry(key.to_string()).or_default().value())
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Current state of `key`; untracked providers are healthy
    #[must_use]
    pub fn status(&self, key: &str) -> HealthState {
        let Some(health) = self.providers.get(key).map(|e| Arc::clone(e.value())) else {
            return HealthState::Healthy;
        };

        if !health.tripped.load(Ordering::Acquire) {
            return HealthState::Healthy;
        }

        let since_ms = self
            .now_ms()
            .saturating_sub(health.tripped_at_ms.load(Ordering::Acquire));
        if Duration::from_millis(since_ms) >= self.config.recovery_timeout {
            HealthState::Recovering
        } else {
            HealthState::Unhealthy
        }
    }

    /// Whether `key` may be selected
    #[must_use]
    pub fn is_available(&self, key: &str) -> bool {
        self.status(key).is_available()
    }

    /// Consecutive failures since the last success
    #[must_use]
    pub fn consecutive_failures(&self, key: &str) -> u32 {
        self.providers
            .get(key)
            .map_or(0, |e| e.consecutive_failures.load(Ordering::Acquire))
    }

    /// A call to `key` succeeded
    pub fn record_success(&self, key: &str) {
        let health = self.entry(key);
        health.consecutive_failures.store(0, Ordering::Release);
        if health.tripped.swap(false, Ordering::AcqRel) {
            tracing::info!(provider = %key, "Provider recovered");
        }
    }

    /// A call to `key` failed
    pub fn record_failure(&self, key: &str) {
        let health = self.entry(key);
        let failures = health.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        if failures >= self.config.failure_threshold {
            let was_recovering = self.status(key) == HealthState::Recovering;
            health.tripped_at_ms.store(self.now_ms(), Ordering::Release);
            let was_tripped = health.tripped.swap(true, Ordering::AcqRel);

            if !was_tripped {
                tracing::warn!(
                    provider = %key,
                    failures,
                    recovery_secs = self.config.recovery_timeout.as_secs(),
                    "Provider marked unhealthy"
                );
            } else if was_recovering {
                tracing::warn!(provider = %key, "Provider failed while recovering");
            }
        }
    }

    /// Force a state from an active probe
    pub fn mark(&self, key: &str, healthy: bool) {
        if healthy {
            self.record_success(key);
            return;
        }

        let health = self.entry(key);
        health
            .consecutive_failures
            .fetch_max(self.config.failure_threshold, Ordering::AcqRel);
        health.tripped_at_ms.store(self.now_ms(), Ordering::Release);
        if !health.tripped.swap(true, Ordering::AcqRel) {
            tracing::warn!(provider = %key, "Probe marked provider unhealthy");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(threshold: u32, recovery: Duration) -> HealthTracker {
        HealthTracker::new(HealthConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery,
        })
    }

    #[test]
    fn test_unknown_provider_is_healthy() {
        let health = HealthTracker::default();
        assert_eq!(health.status("gpt-4"), HealthState::Healthy);
        assert!(health.is_available("gpt-4"));
    }

    #[test]
    fn test_threshold_trips_provider() {
        let health = tracker(3, Duration::from_secs(60));
        health.record_failure("gpt-4");
        health.record_failure("gpt-4");
        assert_eq!(health.status("gpt-4"), HealthState::Healthy);

        health.record_failure("gpt-4");
        assert_eq!(health.status("gpt-4"), HealthState::Unhealthy);
        assert!(!health.is_available("gpt-4"));
        assert_eq!(health.consecutive_failures("gpt-4"), 3);
    }

    #[test]
    fn test_success_resets_failures() {
        let health = tracker(3, Duration::from_secs(60));
        health.record_failure("claude-3");
        health.record_failure("claude-3");
        health.record_success("claude-3");
        health.record_failure("claude-3");

        assert_eq!(health.consecutive_failures("claude-3"), 1);
        assert_eq!(health.status("claude-3"), HealthState::Healthy);
    }

    #[test]
    fn test_recovery_timeout_moves_to_recovering() {
        let health = tracker(1, Duration::ZERO);
        health.record_failure("grok");
        assert_eq!(health.status("grok"), HealthState::Recovering);
        assert!(health.is_available("grok"));

        health.record_success("grok");
        assert_eq!(health.status("grok"), HealthState::Healthy);
    }

    #[tokio::test]
    async fn test_recovers_after_timeout_elapses() {
        let health = tracker(1, Duration::from_millis(30));
        health.record_failure("grok");
        assert_eq!(health.status("grok"), HealthState::Unhealthy);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(health.status("grok"), HealthState::Recovering);
    }

    #[test]
    fn test_mark_from_probe() {
        let health = tracker(3, Duration::from_secs(60));
        health.mark("gpt-4", false);
        assert_eq!(health.status("gpt-4"), HealthState::Unhealthy);

        health.mark("gpt-4", true);
        assert_eq!(health.status("gpt-4"), HealthState::Healthy);
        assert_eq!(health.consecutive_failures("gpt-4"), 0);
    }
}
