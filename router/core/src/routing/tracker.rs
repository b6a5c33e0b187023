//! Performance Tracker
//!
//! Rolling performance profile per provider, fed by the dispatcher after every
//! completed attempt and read by the selector when scoring.
//!
//! # Update Rules
//!
//! ```text
//! avg_latency'    = (avg_latency * total + elapsed) / (total + 1)
//! success_rate'   = successes' / (total + 1)
//! avg_confidence' = (avg_confidence * total + confidence) / (total + 1)   success only
//! total'          = total + 1
//! ```
//!
//! Averages are unweighted: old observations never decay. A bounded log of
//! the most recent attempts backs windowed views ([`PerformanceTracker::recent`])
//! in which an old outage no longer shows.
//!
//! # Thread Safety
//!
//! Each provider has its own `parking_lot::Mutex`, held for the duration of a
//! single `record`. The `DashMap` shard guard is released before the mutex is
//! taken, so no lock spans more than one provider. The attempt log has its
//! own mutex, taken after the provider mutex is released.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

/// Success rate reported before any attempt completes
pub const PRIOR_SUCCESS_RATE: f64 = 1.0;

/// Confidence reported before any attempt succeeds
pub const PRIOR_CONFIDENCE: f64 = 0.8;

/// Attempts kept in the recent-attempt log
pub const RECENT_CAPACITY: usize = 1000;

/// Window used by health reports for recent performance
pub const RECENT_WINDOW: Duration = Duration::from_secs(10 * 60);

// ============================================================================
// Observations
// ============================================================================

/// Outcome of one completed attempt, as fed to the tracker
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    /// Attempt latency
    pub elapsed_ms: u64,
    /// Whether the provider answered
    pub success: bool,
    /// Response confidence; ignored on failure
    pub confidence: f64,
    /// Tokens reported by the provider
    pub tokens_used: Option<u32>,
    /// Estimated cost of the attempt
    pub cost: f64,
}

impl Observation {
    /// A successful attempt without usage data
    #[must_use]
    pub fn success(elapsed_ms: u64, confidence: f64) -> Self {
        Self {
            elapsed_ms,
            success: true,
            confidence,
            tokens_used: None,
            cost: 0.0,
        }
    }

    /// A failed attempt
    #[must_use]
    pub fn failure(elapsed_ms: u64) -> Self {
        Self {
            elapsed_ms,
            success: false,
            confidence: 0.0,
            tokens_used: None,
            cost: 0.0,
        }
    }

    /// Attach token usage and cost
    #[must_use]
    pub fn with_usage(mut self, tokens_used: Option<u32>, cost: f64) -> Self {
        self.tokens_used = tokens_used;
        self.cost = cost.max(0.0);
        self
    }
}

/// One entry of the recent-attempt log
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// Provider key
    pub provider: String,
    /// When the attempt completed
    pub timestamp: DateTime<Utc>,
    /// Attempt latency
    pub latency_ms: u64,
    /// Whether the provider answered
    pub success: bool,
    /// Tokens reported by the provider
    pub tokens_used: u32,
    /// Estimated cost
    pub cost: f64,
}

/// Summary of one provider's attempts inside a time window
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecentStats {
    /// Provider key
    pub provider: String,
    /// Window length in seconds
    pub window_secs: u64,
    /// Attempts in the window
    pub attempts: u64,
    /// Successful attempts in the window
    pub successes: u64,
    /// `successes / attempts`; `None` without attempts
    pub success_rate: Option<f64>,
    /// Mean latency in the window; `None` without attempts
    pub avg_latency_ms: Option<f64>,
    /// Tokens used in the window
    pub total_tokens: u64,
    /// Cost accrued in the window
    pub total_cost: f64,
}

impl RecentStats {
    /// Summarize the records of `provider` among `records`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summarize(provider: &str, window: Duration, records: &[AttemptRecord]) -> Self {
        let mut stats = Self {
            provider: provider.to_string(),
            window_secs: window.as_secs(),
            attempts: 0,
            successes: 0,
            success_rate: None,
            avg_latency_ms: None,
            total_tokens: 0,
            total_cost: 0.0,
        };

        let mut latency_sum = 0u64;
        for record in records.iter().filter(|r| r.provider == provider) {
            stats.attempts += 1;
            if record.success {
                stats.successes += 1;
            }
            latency_sum = latency_sum.saturating_add(record.latency_ms);
            stats.total_tokens += u64::from(record.tokens_used);
            stats.total_cost += record.cost;
        }

        if stats.attempts > 0 {
            let n = stats.attempts as f64;
            stats.success_rate = Some(stats.successes as f64 / n);
            stats.avg_latency_ms = Some(latency_sum as f64 / n);
        }
        stats
    }
}

// ============================================================================
// Performance Profile
// ============================================================================

/// Point-in-time view of one provider's observed behavior
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PerformanceProfile {
    /// Provider key
    pub provider: String,

    /// Completed attempts, successful or not
    pub total_requests: u64,

    /// Successful attempts
    pub successful_requests: u64,

    /// `successful_requests / total_requests`, or the prior when untested
    pub success_rate: f64,

    /// Mean latency across all attempts
    pub avg_latency_ms: f64,

    /// Mean confidence across successful attempts
    pub avg_confidence: f64,

    /// Tokens reported by successful attempts
    pub total_tokens: u64,

    /// Estimated cost of successful attempts
    pub total_cost: f64,

    /// When the provider last succeeded
    pub last_success: Option<DateTime<Utc>>,

    /// When the provider last failed
    pub last_failure: Option<DateTime<Utc>>,
}

impl PerformanceProfile {
    /// Profile of a provider that has never been attempted
    pub fn untested(provider: impl Into<String>) -> Self {
        ProfileState::default().to_profile(provider.into())
    }

    /// Failed attempts
    #[must_use]
    pub fn failed_requests(&self) -> u64 {
        self.total_requests - self.successful_requests
    }
}

#[derive(Debug)]
struct ProfileState {
    total: u64,
    successes: u64,
    avg_latency_ms: f64,
    avg_confidence: f64,
    total_tokens: u64,
    total_cost: f64,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
}

impl Default for ProfileState {
    fn default() -> Self {
        Self {
            total: 0,
            successes: 0,
            avg_latency_ms: 0.0,
            avg_confidence: PRIOR_CONFIDENCE,
            total_tokens: 0,
            total_cost: 0.0,
            last_success: None,
            last_failure: None,
        }
    }
}

impl ProfileState {
    #[allow(clippy::cast_precision_loss)]
    fn apply(&mut self, observation: &Observation, at: DateTime<Utc>) {
        let n = self.total as f64;

        self.avg_latency_ms =
            (self.avg_latency_ms * n + observation.elapsed_ms as f64) / (n + 1.0);
        if observation.success {
            self.avg_confidence =
                (self.avg_confidence * n + observation.confidence.clamp(0.0, 1.0)) / (n + 1.0);
            self.successes += 1;
            self.total_tokens += u64::from(observation.tokens_used.unwrap_or_default());
            self.total_cost += observation.cost;
            self.last_success = Some(at);
        } else {
            self.last_failure = Some(at);
        }
        self.total += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            PRIOR_SUCCESS_RATE
        } else {
            self.successes as f64 / self.total as f64
        }
    }

    fn to_profile(&self, provider: String) -> PerformanceProfile {
        PerformanceProfile {
            provider,
            total_requests: self.total,
            successful_requests: self.successes,
            success_rate: self.success_rate(),
            avg_latency_ms: self.avg_latency_ms,
            avg_confidence: self.avg_confidence,
            total_tokens: self.total_tokens,
            total_cost: self.total_cost,
            last_success: self.last_success,
            last_failure: self.last_failure,
        }
    }
}

// ============================================================================
// Performance Tracker
// ============================================================================

/// Concurrent store of per-provider performance profiles
#[derive(Debug)]
pub struct PerformanceTracker {
    profiles: DashMap<String, Arc<Mutex<ProfileState>>>,
    recent: Mutex<VecDeque<AttemptRecord>>,
    recent_capacity: usize,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::with_recent_capacity(RECENT_CAPACITY)
    }
}

impl PerformanceTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty tracker keeping at most `capacity` recent attempts
    #[must_use]
    pub fn with_recent_capacity(capacity: usize) -> Self {
        Self {
            profiles: DashMap::new(),
            recent: Mutex::new(VecDeque::with_capacity(capacity.min(RECENT_CAPACITY))),
            recent_capacity: capacity,
        }
    }

    fn slot(&self, key: &str) -> Arc<Mutex<ProfileState>> {
        if let Some(existing) = self.profiles.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.profiles.entry(key.to_string()).or_default().value())
    }

    /// Record one completed attempt
    ///
    /// `confidence` only contributes when `success` is true.
    pub fn record(&self, key: &str, elapsed_ms: u64, success: bool, confidence: f64) {
        let observation = if success {
            Observation::success(elapsed_ms, confidence)
        } else {
            Observation::failure(elapsed_ms)
        };
        self.observe(key, observation);
    }

    /// Record one completed attempt with its usage
    pub fn observe(&self, key: &str, observation: Observation) {
        self.observe_at(key, observation, Utc::now());
    }

    fn observe_at(&self, key: &str, observation: Observation, at: DateTime<Utc>) {
        {
            let slot = self.slot(key);
            let mut state = slot.lock();
            state.apply(&observation, at);

            tracing::trace!(
                provider = %key,
                elapsed_ms = observation.elapsed_ms,
                success = observation.success,
                total = state.total,
                success_rate = state.success_rate(),
                "Recorded attempt"
            );
        }

        if self.recent_capacity == 0 {
            return;
        }
        let mut recent = self.recent.lock();
        while recent.len() >= self.recent_capacity {
            recent.pop_front();
        }
        let (tokens_used, cost) = if observation.success {
            (observation.tokens_used.unwrap_or_default(), observation.cost)
        } else {
            (0, 0.0)
        };
        recent.push_back(AttemptRecord {
            provider: key.to_string(),
            timestamp: at,
            latency_ms: observation.elapsed_ms,
            success: observation.success,
            tokens_used,
            cost,
        });
    }

    /// Logged attempts that completed within `window` of now, oldest first
    #[must_use]
    pub fn recent(&self, window: Duration) -> Vec<AttemptRecord> {
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| Utc::now().checked_sub_signed(w));

        self.recent
            .lock()
            .iter()
            .filter(|record| cutoff.map_or(true, |c| record.timestamp >= c))
            .cloned()
            .collect()
    }

    /// Windowed summary for each of `keys`, in the given order
    #[must_use]
    pub fn recent_stats(&self, keys: &[String], window: Duration) -> Vec<RecentStats> {
        let records = self.recent(window);
        keys.iter()
            .map(|key| RecentStats::summarize(key, window, &records))
            .collect()
    }

    /// Current profile for `key`; priors when it has never been attempted
    #[must_use]
    pub fn snapshot(&self, key: &str) -> PerformanceProfile {
        let slot = self.profiles.get(key).map(|entry| Arc::clone(entry.value()));
        match slot {
            Some(slot) => slot.lock().to_profile(key.to_string()),
            None => PerformanceProfile::untested(key),
        }
    }

    /// Profiles of every provider that has been recorded
    #[must_use]
    pub fn snapshot_all(&self) -> HashMap<String, PerformanceProfile> {
        let slots: Vec<(String, Arc<Mutex<ProfileState>>)> = self
            .profiles
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        slots
            .into_iter()
            .map(|(key, slot)| {
                let profile = slot.lock().to_profile(key.clone());
                (key, profile)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_untested_provider_reports_priors() {
        let tracker = PerformanceTracker::new();
        let profile = tracker.snapshot("gpt-4");

        assert_eq!(profile.total_requests, 0);
        assert!(approx(profile.success_rate, 1.0));
        assert!(approx(profile.avg_confidence, 0.8));
        assert!(approx(profile.avg_latency_ms, 0.0));
        assert!(tracker.snapshot_all().is_empty());
    }

    #[test]
    fn test_success_rate_after_successes_then_failure() {
        let tracker = PerformanceTracker::new();
        for n in 1..=5u64 {
            tracker.record("gpt-4", 100, true, 0.9);
            let profile = tracker.snapshot("gpt-4");
            assert_eq!(profile.total_requests, n);
            assert!(approx(profile.success_rate, 1.0));
        }

        tracker.record("gpt-4", 100, false, 0.0);
        let profile = tracker.snapshot("gpt-4");
        assert_eq!(profile.total_requests, 6);
        assert_eq!(profile.failed_requests(), 1);
        assert!(approx(profile.success_rate, 5.0 / 6.0));
        assert!(profile.last_failure.is_some());
    }

    #[test]
    fn test_latency_is_running_mean_of_all_attempts() {
        let tracker = PerformanceTracker::new();
        tracker.record("claude-3", 200, true, 0.5);
        tracker.record("claude-3", 400, false, 0.0);
        tracker.record("claude-3", 900, true, 0.5);

        assert!(approx(tracker.snapshot("claude-3").avg_latency_ms, 500.0));
    }

    #[test]
    fn test_failure_leaves_confidence_untouched() {
        let tracker = PerformanceTracker::new();
        tracker.record("grok", 100, true, 0.6);
        assert!(approx(tracker.snapshot("grok").avg_confidence, 0.6));

        tracker.record("grok", 100, false, 0.99);
        assert!(approx(tracker.snapshot("grok").avg_confidence, 0.6));

        // (0.6 * 2 + 0.9) / 3
        tracker.record("grok", 100, true, 0.9);
        assert!(approx(tracker.snapshot("grok").avg_confidence, 0.7));
    }

    #[test]
    fn test_usage_accumulates_on_success_only() {
        let tracker = PerformanceTracker::new();
        tracker.observe("gpt-4", Observation::success(100, 0.9).with_usage(Some(100), 0.003));
        tracker.observe("gpt-4", Observation::success(100, 0.9).with_usage(Some(50), 0.0015));
        tracker.observe("gpt-4", Observation::failure(100).with_usage(Some(999), 1.0));

        let profile = tracker.snapshot("gpt-4");
        assert_eq!(profile.total_tokens, 150);
        assert!(approx(profile.total_cost, 0.0045));

        let logged: Vec<u32> = tracker
            .recent(Duration::from_secs(60))
            .iter()
            .map(|r| r.tokens_used)
            .collect();
        assert_eq!(logged, vec![100, 50, 0]);
    }

    #[test]
    fn test_recent_log_is_bounded() {
        let tracker = PerformanceTracker::with_recent_capacity(5);
        for i in 0..8u64 {
            tracker.record("gpt-4", i, true, 0.5);
        }

        let recent = tracker.recent(Duration::from_secs(60));
        let latencies: Vec<u64> = recent.iter().map(|r| r.latency_ms).collect();
        assert_eq!(latencies, vec![3, 4, 5, 6, 7]);
        assert_eq!(tracker.snapshot("gpt-4").total_requests, 8);
    }

    #[test]
    fn test_default_capacity_keeps_last_thousand() {
        let tracker = PerformanceTracker::new();
        for i in 0..1200u64 {
            tracker.record("grok", i, i % 2 == 0, 0.5);
        }

        let recent = tracker.recent(Duration::from_secs(3600));
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent[0].latency_ms, 200);
    }

    #[test]
    fn test_recent_window_excludes_old_attempts() {
        let tracker = PerformanceTracker::new();
        let long_ago = Utc::now() - chrono::Duration::minutes(30);
        for _ in 0..4 {
            tracker.observe_at("claude-3", Observation::failure(9000), long_ago);
        }
        tracker.observe(
            "claude-3",
            Observation::success(400, 0.7).with_usage(Some(42), 0.00126),
        );
        tracker.observe("claude-3", Observation::success(600, 0.7));

        // all-time view still carries the outage
        assert!(approx(tracker.snapshot("claude-3").success_rate, 2.0 / 6.0));

        let keys = vec!["claude-3".to_string(), "grok".to_string()];
        let stats = tracker.recent_stats(&keys, RECENT_WINDOW);
        assert_eq!(stats[0].attempts, 2);
        assert_eq!(stats[0].success_rate, Some(1.0));
        assert_eq!(stats[0].avg_latency_ms, Some(500.0));
        assert_eq!(stats[0].total_tokens, 42);
        assert_eq!(stats[0].window_secs, 600);

        assert_eq!(stats[1].provider, "grok");
        assert_eq!(stats[1].attempts, 0);
        assert!(stats[1].success_rate.is_none());

        let wide = tracker.recent(Duration::from_secs(3600));
        assert_eq!(wide.len(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_are_not_lost() {
        let tracker = Arc::new(PerformanceTracker::new());
        let mut handles = Vec::new();

        for task in 0..8u64 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                for i in 0..250u64 {
                    let key = if i % 2 == 0 { "gpt-4" } else { "claude-3" };
                    tracker.record(key, 100 + task, (i + task) % 3 != 0, 0.7);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let all = tracker.snapshot_all();
        let total: u64 = all.values().map(|p| p.total_requests).sum();
        assert_eq!(total, 2000);
        for profile in all.values() {
            assert!(profile.successful_requests <= profile.total_requests);
            assert!((0.0..=1.0).contains(&profile.success_rate));
        }
    }
}
