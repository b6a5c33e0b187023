//! TOML Configuration File Support
//!
//! Router configuration is read once at startup from
//! `~/.config/metarouter/router.toml` and is never hot-reloaded.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. Environment variables
//! 2. TOML configuration file
//! 3. Built-in defaults (GPT-4, Claude 3 and Grok)
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/metarouter/router.toml` (typically `~/.config/metarouter/router.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [routing]
//! fallback_order = ["gpt-4", "claude-3", "grok"]
//! default_timeout_ms = 30000
//! health_check_interval_secs = 300
//! probe_timeout_ms = 10000
//!
//! [health]
//! failure_threshold = 3
//! recovery_timeout_secs = 30
//!
//! [providers.gpt-4]
//! kind = "openai"
//! display_name = "GPT-4"
//! model = "gpt-4"
//! endpoint = "https://api.openai.com/v1/chat/completions"
//! api_key_env = "OPENAI_API_KEY"
//! max_tokens = 4096
//! temperature = 0.7
//! cost_per_token = 0.00003
//! ```
//!
//! A `[providers.<key>]` table for a built-in key only needs the fields it
//! changes. New keys must set `kind` and `endpoint`, and are registered after
//! the built-ins in key order. `enabled = false` removes a provider.
//!
//! # Environment Variables
//!
//! - `OPENAI_ENDPOINT`, `ANTHROPIC_ENDPOINT`, `GROK_ENDPOINT`: endpoint of the
//!   matching built-in provider
//! - `METAROUTER_FALLBACK_ORDER`: comma-separated provider keys
//! - `METAROUTER_TIMEOUT_MS`: default per-attempt timeout

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{Credential, Provider, ProviderKind, ProviderRegistry};
use crate::routing::{HealthConfig, RouterOptions};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Routing section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingToml {
    /// Provider keys in fallback order
    pub fallback_order: Option<Vec<String>>,

    /// Per-attempt timeout in milliseconds
    pub default_timeout_ms: Option<u64>,

    /// Active probe interval in seconds (0 disables)
    pub health_check_interval_secs: Option<u64>,

    /// Timeout of each active probe in milliseconds
    pub probe_timeout_ms: Option<u64>,
}

/// Health section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthToml {
    /// Consecutive failures before a provider is unhealthy
    pub failure_threshold: Option<u32>,

    /// Seconds an unhealthy provider stays unavailable
    pub recovery_timeout_secs: Option<u64>,
}

/// One `[providers.<key>]` table
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// Set to false to drop the provider
    pub enabled: Option<bool>,
    /// Adapter kind
    pub kind: Option<ProviderKind>,
    /// Human-readable name
    pub display_name: Option<String>,
    /// Upstream model identifier
    pub model: Option<String>,
    /// Completion endpoint URL
    pub endpoint: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Inline API key, used only when `api_key_env` yields nothing
    pub api_key: Option<String>,
    /// Default token limit
    pub max_tokens: Option<u32>,
    /// Default temperature
    pub temperature: Option<f32>,
    /// Estimated cost per token
    pub cost_per_token: Option<f64>,
}

/// Root TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterToml {
    /// Routing settings
    pub routing: RoutingToml,

    /// Health gate settings
    pub health: HealthToml,

    /// Provider definitions keyed by provider key
    pub providers: BTreeMap<String, ProviderToml>,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// A fully resolved provider definition
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderConfig {
    /// Routing key
    pub key: String,
    /// Adapter kind
    pub kind: ProviderKind,
    /// Human-readable name
    pub display_name: String,
    /// Upstream model identifier
    pub model: String,
    /// Completion endpoint URL
    pub endpoint: String,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Inline API key
    pub api_key: Option<String>,
    /// Default token limit
    pub max_tokens: u32,
    /// Default temperature
    pub temperature: f32,
    /// Estimated cost per token
    pub cost_per_token: f64,
}

impl ProviderConfig {
    fn builtin(
        key: &str,
        kind: ProviderKind,
        display_name: &str,
        endpoint: &str,
        api_key_env: &str,
        cost_per_token: f64,
    ) -> Self {
        Self {
            key: key.to_string(),
            kind,
            display_name: display_name.to_string(),
            model: kind.default_model().to_string(),
            endpoint: endpoint.to_string(),
            api_key_env: Some(api_key_env.to_string()),
            api_key: None,
            max_tokens: 4096,
            temperature: 0.7,
            cost_per_token,
        }
    }

    /// Resolve the credential: environment first, then the inline key
    #[must_use]
    pub fn credential(&self) -> Credential {
        let from_env = self
            .api_key_env
            .as_deref()
            .map(Credential::from_env)
            .unwrap_or_default();
        if from_env.is_present() {
            return from_env;
        }
        self.api_key.clone().map(Credential::new).unwrap_or_default()
    }

    /// Build the registry entry
    #[must_use]
    pub fn to_provider(&self) -> Provider {
        Provider::new(&self.key, self.kind, &self.endpoint)
            .with_display_name(&self.display_name)
            .with_model(&self.model)
            .with_credential(self.credential())
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_cost_per_token(self.cost_per_token)
    }
}

/// The built-in provider set
#[must_use]
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::builtin(
            "gpt-4",
            ProviderKind::OpenAi,
            "GPT-4",
            "https://api.openai.com/v1/chat/completions",
            "OPENAI_API_KEY",
            0.000_03,
        ),
        ProviderConfig::builtin(
            "claude-3",
            ProviderKind::Anthropic,
            "Claude 3",
            "https://api.anthropic.com/v1/messages",
            "ANTHROPIC_API_KEY",
            0.000_015,
        ),
        ProviderConfig::builtin(
            "grok",
            ProviderKind::Grok,
            "Grok",
            "https://api.x.ai/v1/chat/completions",
            "GROK_API_KEY",
            0.000_01,
        ),
    ]
}

/// Routing settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingSettings {
    /// Provider keys in fallback order
    pub fallback_order: Vec<String>,
    /// Per-attempt timeout in milliseconds
    pub default_timeout_ms: u64,
    /// Active probe interval in seconds (0 disables)
    pub health_check_interval_secs: u64,
    /// Timeout of each active probe in milliseconds
    pub probe_timeout_ms: u64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            fallback_order: vec!["gpt-4".into(), "claude-3".into(), "grok".into()],
            default_timeout_ms: 30_000,
            health_check_interval_secs: 300,
            probe_timeout_ms: 10_000,
        }
    }
}

/// Health gate settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthSettings {
    /// Consecutive failures before a provider is unhealthy
    pub failure_threshold: u32,
    /// Seconds an unhealthy provider stays unavailable
    pub recovery_timeout_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout_secs: 30,
        }
    }
}

/// Complete router configuration
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Routing settings
    pub routing: RoutingSettings,

    /// Health gate settings
    pub health: HealthSettings,

    /// Providers in registration order
    pub providers: Vec<ProviderConfig>,

    /// Path of the loaded config file, if any
    pub config_file_path: Option<PathBuf>,

    /// Where the configuration came from
    pub source: ConfigSource,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            routing: RoutingSettings::default(),
            health: HealthSettings::default(),
            providers: default_providers(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl RouterConfig {
    /// Find a provider definition by key
    #[must_use]
    pub fn provider(&self, key: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.key == key)
    }

    fn provider_mut(&mut self, key: &str) -> Option<&mut ProviderConfig> {
        self.providers.iter_mut().find(|p| p.key == key)
    }

    /// Registry populated with every configured provider
    #[must_use]
    pub fn build_registry(&self) -> ProviderRegistry {
        let registry =
            ProviderRegistry::from_providers(self.providers.iter().map(ProviderConfig::to_provider));
        for provider in registry.list() {
            if !provider.credential.is_present() {
                tracing::warn!(provider = %provider.key, "No API key configured; calls will fail");
            }
        }
        registry
    }

    /// Runtime options for the router
    #[must_use]
    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            default_timeout: Duration::from_millis(self.routing.default_timeout_ms),
            probe_timeout: Duration::from_millis(self.routing.probe_timeout_ms),
            health: HealthConfig {
                failure_threshold: self.health.failure_threshold,
                recovery_timeout: Duration::from_secs(self.health.recovery_timeout_secs),
            },
        }
    }

    /// Interval between active health probes (zero disables them)
    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.routing.health_check_interval_secs)
    }

    /// Check cross-field invariants
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one provider must be configured".to_string(),
            ));
        }
        for provider in &self.providers {
            if provider.endpoint.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}' has an empty endpoint",
                    provider.key
                )));
            }
            if !(0.0..=2.0).contains(&provider.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}' temperature {} is outside 0.0..=2.0",
                    provider.key, provider.temperature
                )));
            }
            if provider.max_tokens == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}' max_tokens must be greater than zero",
                    provider.key
                )));
            }
        }

        if self.routing.fallback_order.is_empty() {
            return Err(ConfigError::ValidationError(
                "routing.fallback_order must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for key in &self.routing.fallback_order {
            if !seen.insert(key) {
                return Err(ConfigError::ValidationError(format!(
                    "routing.fallback_order lists '{key}' more than once"
                )));
            }
            if self.provider(key).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "routing.fallback_order names unknown provider '{key}'"
                )));
            }
        }

        if self.routing.default_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "routing.default_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.routing.probe_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "routing.probe_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.health.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "health.failure_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/metarouter/router.toml` or
/// `~/.config/metarouter/router.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("metarouter").join("router.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// result fails validation. A missing config file is not an error.
pub fn load_config() -> Result<RouterConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the result fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<RouterConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<RouterConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = RouterConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: RouterToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Parse configuration from a TOML string on top of the defaults
///
/// Environment variables are not consulted.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or the result is invalid.
pub fn parse_config(toml_content: &str) -> Result<RouterConfig, ConfigError> {
    let mut config = RouterConfig::default();
    let toml_config: RouterToml = toml::from_str(toml_content)?;
    apply_toml_config(&mut config, toml_config)?;
    config.source = ConfigSource::File;
    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut RouterConfig, toml: RouterToml) -> Result<(), ConfigError> {
    // Routing settings
    if let Some(order) = toml.routing.fallback_order {
        config.routing.fallback_order = order;
    }
    if let Some(timeout) = toml.routing.default_timeout_ms {
        config.routing.default_timeout_ms = timeout;
    }
    if let Some(interval) = toml.routing.health_check_interval_secs {
        config.routing.health_check_interval_secs = interval;
    }
    if let Some(timeout) = toml.routing.probe_timeout_ms {
        config.routing.probe_timeout_ms = timeout;
    }

    // Health settings
    if let Some(threshold) = toml.health.failure_threshold {
        config.health.failure_threshold = threshold;
    }
    if let Some(secs) = toml.health.recovery_timeout_secs {
        config.health.recovery_timeout_secs = secs;
    }

    // Provider settings
    for (key, entry) in toml.providers {
        if entry.enabled == Some(false) {
            config.providers.retain(|p| p.key != key);
            continue;
        }

        if config.provider(&key).is_none() {
            let kind = entry.kind.ok_or_else(|| {
                ConfigError::ValidationError(format!("provider '{key}' must set 'kind'"))
            })?;
            let endpoint = entry.endpoint.clone().ok_or_else(|| {
                ConfigError::ValidationError(format!("provider '{key}' must set 'endpoint'"))
            })?;
            config.providers.push(ProviderConfig {
                key: key.clone(),
                kind,
                display_name: key.clone(),
                model: kind.default_model().to_string(),
                endpoint,
                api_key_env: None,
                api_key: None,
                max_tokens: 4096,
                temperature: 0.7,
                cost_per_token: 0.0,
            });
        }

        if let Some(provider) = config.provider_mut(&key) {
            merge_provider(provider, entry);
        }
    }

    Ok(())
}

fn merge_provider(provider: &mut ProviderConfig, entry: ProviderToml) {
    if let Some(kind) = entry.kind {
        if entry.model.is_none() && kind != provider.kind {
            provider.model = kind.default_model().to_string();
        }
        provider.kind = kind;
    }
    if let Some(name) = entry.display_name {
        provider.display_name = name;
    }
    if let Some(model) = entry.model {
        provider.model = model;
    }
    if let Some(endpoint) = entry.endpoint {
        provider.endpoint = endpoint;
    }
    if entry.api_key_env.is_some() {
        provider.api_key_env = entry.api_key_env;
    }
    if entry.api_key.is_some() {
        provider.api_key = entry.api_key;
    }
    if let Some(max_tokens) = entry.max_tokens {
        provider.max_tokens = max_tokens;
    }
    if let Some(temperature) = entry.temperature {
        provider.temperature = temperature;
    }
    if let Some(cost) = entry.cost_per_token {
        provider.cost_per_token = cost;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut RouterConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Endpoints of the built-in providers
    for (var, key) in [
        ("OPENAI_ENDPOINT", "gpt-4"),
        ("ANTHROPIC_ENDPOINT", "claude-3"),
        ("GROK_ENDPOINT", "grok"),
    ] {
        if let Some(endpoint) = env(var).filter(|v| !v.trim().is_empty()) {
            if let Some(provider) = config.provider_mut(key) {
                provider.endpoint = endpoint;
                config.source = ConfigSource::Env;
            }
        }
    }

    // Routing settings
    if let Some(order) = env("METAROUTER_FALLBACK_ORDER") {
        let keys: Vec<String> = order
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect();
        if !keys.is_empty() {
            config.routing.fallback_order = keys;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(timeout) = env("METAROUTER_TIMEOUT_MS") {
        if let Ok(ms) = timeout.trim().parse::<u64>() {
            config.routing.default_timeout_ms = ms;
            config.source = ConfigSource::Env;
        } else {
            tracing::warn!(value = %timeout, "Ignoring unparseable METAROUTER_TIMEOUT_MS");
        }
    }
}
