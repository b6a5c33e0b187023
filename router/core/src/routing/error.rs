//! Routing Errors

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::adapter::ProviderCallError;

/// One failed provider attempt, kept for exhaustion diagnostics
#[derive(Clone, Debug, Serialize)]
pub struct AttemptFailure {
    /// Provider key that was attempted
    pub provider: String,
    /// Why the attempt failed
    pub error: ProviderCallError,
    /// How long the attempt ran before failing
    pub elapsed_ms: u64,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}ms): {}", self.provider, self.elapsed_ms, self.error)
    }
}

/// Errors surfaced by the router
#[derive(Clone, Debug, Error)]
pub enum RouterError {
    /// The request was rejected before any provider was contacted
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A provider key is not registered
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// Every candidate provider failed for this request
    #[error("All providers exhausted after {} attempt(s): {}", .attempts.len(), format_attempts(.attempts))]
    AllProvidersExhausted {
        /// Attempts in the order they were made
        attempts: Vec<AttemptFailure>,
    },

    /// The router could not be built from its configuration
    #[error("Router configuration error: {0}")]
    Configuration(String),
}

impl RouterError {
    /// Provider keys attempted before exhaustion (empty for other variants)
    #[must_use]
    pub fn attempted_providers(&self) -> Vec<&str> {
        match self {
            Self::AllProvidersExhausted { attempts } => {
                attempts.iter().map(|a| a.provider.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn format_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
