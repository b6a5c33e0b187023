//! Adaptive Query Routing
//!
//! Selection, dispatch and fallback across remote inference providers, driven
//! by live performance history.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |    MetaRouter    |  <-- route / performance_metrics / health_status
//! +--------+---------+
//!          |
//!          v
//! +------------------+        +--------------------+
//! |    Dispatcher    | -----> | PerformanceTracker |  <-- record after each attempt
//! +--------+---------+        +--------------------+
//!          |                  |   HealthTracker    |
//!          v                  +--------------------+
//! +------------------+                  ^
//! |     Selector     | -----------------+  <-- scores + availability
//! +--------+---------+
//!          |
//!    +-----+------+
//!    |     |      |
//!    v     v      v
//! +------+ +---------+ +----+
//! |OpenAI| |Anthropic| |Grok|  <-- ProviderAdapter implementations
//! +------+ +---------+ +----+
//! ```

pub mod dispatcher;
pub mod error;
pub mod health;
pub mod metrics;
pub mod request;
pub mod router;
pub mod selector;
pub mod tracker;

pub use dispatcher::{response_confidence, AdapterSet, Dispatcher, DEFAULT_TIMEOUT};
pub use error::{AttemptFailure, RouterError};
pub use health::{HealthConfig, HealthState, HealthTracker};
pub use metrics::{RouterMetrics, RouterMetricsSnapshot};
pub use request::{QueryRequest, QueryResponse};
pub use router::{
    HealthReport, MetaRouter, OverallHealth, ProbeResult, ProviderAvailability, RouterOptions,
};
pub use selector::{composite_score, RankedProvider, Selection, SelectionReason, Selector};
pub use tracker::{
    AttemptRecord, Observation, PerformanceProfile, PerformanceTracker, RecentStats,
    RECENT_CAPACITY, RECENT_WINDOW,
};

#[cfg(test)]
pub mod test_utils;
