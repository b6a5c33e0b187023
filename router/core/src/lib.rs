//! Router Core - Adaptive Multi-Provider Query Routing
//!
//! Dispatches natural-language queries to remote inference providers
//! (OpenAI, Anthropic, xAI Grok), picks the provider expected to perform best
//! from live performance history, and walks a fixed fallback order when a
//! provider fails.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Host (CLI / HTTP layer)                  │
//! │        route  ·  performance_metrics  ·  health_status        │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────┐
//! │                         ROUTER CORE                          │
//! │  ┌───────────┐  ┌────────────┐  ┌──────────┐  ┌───────────┐  │
//! │  │ Registry  │  │  Selector  │  │ Tracker  │  │  Health   │  │
//! │  └───────────┘  └─────┬──────┘  └────▲─────┘  └─────▲─────┘  │
//! │                       │              │              │        │
//! │                 ┌─────▼──────────────┴──────────────┴──┐     │
//! │                 │              Dispatcher              │     │
//! │                 └─────────────────┬────────────────────┘     │
//! │                                   │                          │
//! │                 ┌─────────────────▼────────────────────┐     │
//! │                 │  Adapters: OpenAI · Anthropic · Grok  │     │
//! │                 └──────────────────────────────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use router_core::{load_config, MetaRouter, QueryRequest};
//!
//! let config = load_config()?;
//! let router = MetaRouter::from_config(&config)?;
//!
//! let response = router.route(&QueryRequest::new("What is Rust?")).await?;
//! println!("{} answered: {}", response.model, response.response);
//! ```
//!
//! # Module Overview
//!
//! - [`registry`]: Provider catalog and credentials
//! - [`adapter`]: Per-provider wire formats behind [`adapter::ProviderAdapter`]
//! - [`routing`]: Tracker, selector, dispatcher, health gate, metrics and the [`MetaRouter`] facade
//! - [`config`]: TOML configuration with environment overrides

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod config;
pub mod registry;
pub mod routing;

// Re-exports for convenience
pub use adapter::{CallErrorKind, Completion, ProviderAdapter, ProviderCallError};
pub use registry::{Credential, Provider, ProviderKind, ProviderRegistry};

// Routing exports
pub use routing::{
    AttemptFailure, HealthReport, HealthState, MetaRouter, OverallHealth, PerformanceProfile,
    ProbeResult, ProviderAvailability, QueryRequest, QueryResponse, RecentStats, RouterError,
    RouterOptions,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, parse_config, ConfigError,
    ConfigSource, ProviderConfig, RouterConfig,
};
