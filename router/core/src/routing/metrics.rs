//! Router Metrics
//!
//! Process-wide routing counters:
//! - Routing outcomes (served, via fallback, exhausted, rejected)
//! - Provider attempts and failures
//! - Latency of successful routes
//!
//! Per-provider statistics live in the performance tracker; these counters
//! describe the router as a whole.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Latency bucket upper bounds, in milliseconds
const LATENCY_BUCKETS_MS: [u64; 12] = [
    50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 20_000, 30_000, 60_000, 120_000,
];

// ============================================================================
// Counter
// ============================================================================

/// Monotonic atomic counter
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Add one
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Latency Histogram
// ============================================================================

/// Fixed-bucket latency histogram
///
/// The last bucket also absorbs values beyond its bound.
#[derive(Debug)]
pub struct LatencyHistogram {
    counts: Vec<AtomicU64>,
    total: AtomicU64,
    sum_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self {
            counts: LATENCY_BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
            total: AtomicU64::new(0),
            sum_ms: AtomicU64::new(0),
            max_ms: AtomicU64::new(0),
        }
    }
}

impl LatencyHistogram {
    /// Record one observation
    pub fn record(&self, value_ms: u64) {
        let idx = LATENCY_BUCKETS_MS
            .iter()
            .position(|&bound| value_ms <= bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len() - 1);

        self.counts[idx].fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(value_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(value_ms, Ordering::Relaxed);
    }

    /// Copy of the current distribution
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> HistogramSnapshot {
        let counts: Vec<u64> = self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect();
        let total = self.total.load(Ordering::Relaxed);
        let sum = self.sum_ms.load(Ordering::Relaxed);

        HistogramSnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts,
            total,
            max_ms: self.max_ms.load(Ordering::Relaxed),
            mean_ms: if total == 0 { 0.0 } else { sum as f64 / total as f64 },
        }
    }
}

/// Serializable histogram contents
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    /// Bucket upper bounds
    pub buckets_ms: Vec<u64>,
    /// Observations per bucket
    pub counts: Vec<u64>,
    /// Total observations
    pub total: u64,
    /// Largest observation
    pub max_ms: u64,
    /// Mean observation
    pub mean_ms: f64,
}

impl HistogramSnapshot {
    /// Upper bound of the bucket containing quantile `q` (0.0..=1.0)
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn percentile(&self, q: f64) -> u64 {
        if self.total == 0 {
            return 0;
        }

        let target = ((self.total as f64) * q.clamp(0.0, 1.0)).ceil().max(1.0) as u64;
        let mut cumulative = 0;
        for (bound, count) in self.buckets_ms.iter().zip(&self.counts) {
            cumulative += count;
            if cumulative >= target {
                return *bound;
            }
        }
        self.buckets_ms.last().copied().unwrap_or(0)
    }

    /// Median bucket bound
    #[must_use]
    pub fn p50(&self) -> u64 {
        self.percentile(0.5)
    }

    /// 99th percentile bucket bound
    #[must_use]
    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }
}

// ============================================================================
// Router Metrics
// ============================================================================

/// Routing counters shared by every `route` call
#[derive(Debug)]
pub struct RouterMetrics {
    /// Routing operations started (valid requests only)
    pub routes_total: Counter,
    /// Routing operations that produced a response
    pub routes_succeeded: Counter,
    /// Successful routes served by a fallback provider
    pub routes_fallback: Counter,
    /// Routing operations where every provider failed
    pub routes_exhausted: Counter,
    /// Requests rejected before any provider was contacted
    pub invalid_requests: Counter,
    /// Provider calls made
    pub provider_attempts: Counter,
    /// Provider calls that failed
    pub provider_failures: Counter,
    /// Total time of successful routes
    pub route_latency: LatencyHistogram,
    started: Instant,
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self {
            routes_total: Counter::default(),
            routes_succeeded: Counter::default(),
            routes_fallback: Counter::default(),
            routes_exhausted: Counter::default(),
            invalid_requests: Counter::default(),
            provider_attempts: Counter::default(),
            provider_failures: Counter::default(),
            route_latency: LatencyHistogram::default(),
            started: Instant::now(),
        }
    }
}

impl RouterMetrics {
    /// Create zeroed metrics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializable copy of every counter
    #[must_use]
    pub fn snapshot(&self) -> RouterMetricsSnapshot {
        RouterMetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            routes_total: self.routes_total.get(),
            routes_succeeded: self.routes_succeeded.get(),
            routes_fallback: self.routes_fallback.get(),
            routes_exhausted: self.routes_exhausted.get(),
            invalid_requests: self.invalid_requests.get(),
            provider_attempts: self.provider_attempts.get(),
            provider_failures: self.provider_failures.get(),
            route_latency: self.route_latency.snapshot(),
        }
    }
}

/// Point-in-time copy of [`RouterMetrics`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouterMetricsSnapshot {
    /// Seconds since the metrics were created
    pub uptime_secs: u64,
    /// See [`RouterMetrics::routes_total`]
    pub routes_total: u64,
    /// See [`RouterMetrics::routes_succeeded`]
    pub routes_succeeded: u64,
    /// See [`RouterMetrics::routes_fallback`]
    pub routes_fallback: u64,
    /// See [`RouterMetrics::routes_exhausted`]
    pub routes_exhausted: u64,
    /// See [`RouterMetrics::invalid_requests`]
    pub invalid_requests: u64,
    /// See [`RouterMetrics::provider_attempts`]
    pub provider_attempts: u64,
    /// See [`RouterMetrics::provider_failures`]
    pub provider_failures: u64,
    /// Successful route latency distribution
    pub route_latency: HistogramSnapshot,
}
