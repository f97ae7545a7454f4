//! Error types for the inbox-agents core.

use std::time::Duration;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),
}

/// Configuration-related errors.
///
/// Routing falls back to permissive defaults when per-agent config is
/// missing; destructive admin operations fall back to deny. Only a
/// boot-time `ConfigError` is allowed to be fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid security config for agent {agent}: {message}")]
    InvalidSecurityConfig { agent: String, message: String },
}

/// Recipient resolution failures.
///
/// Resolution fails closed: an unroutable message is dropped with a logged
/// reason, never processed against a guessed tenant.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("No recipient addressed to the service domain {domain}")]
    NoServiceRecipient { domain: String },

    #[error("Unknown agent type '{agent_type}' in recipient {address}")]
    UnknownAgentType { agent_type: String, address: String },

    #[error("Malformed recipient address: {address}")]
    MalformedAddress { address: String },

    #[error("Shared inbox address {address} could not be disambiguated to a tenant")]
    AmbiguousTenant { address: String },
}

/// Persistence boundary errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Intelligence-provider errors.
///
/// `Transient` failures are retried at most once before the caller falls
/// back to deterministic heuristics; the variant split keeps that decision
/// in the signature rather than in a catch-all handler.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider request failed (transient): {0}")]
    Transient(String),

    #[error("Provider request rejected: {0}")]
    Rejected(String),

    #[error("Provider response unparseable: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured")]
    NotConfigured,
}

impl ProviderError {
    /// Whether a single retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Report/analysis pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Report build failed for {key}: {reason}")]
    BuildFailed { key: String, reason: String },

    #[error("Timed out after {timeout:?} waiting for in-flight build of {key}")]
    BuildWaitTimeout { key: String, timeout: Duration },

    #[error("Store error during analysis: {0}")]
    Store(#[from] StoreError),

    #[error("Provider error during analysis: {0}")]
    Provider(#[from] ProviderError),
}

/// Failure raised inside a security policy's `validate`.
///
/// The engine maps any `PolicyError` to a deny-and-quarantine result: a
/// security check must never open-fail.
#[derive(Debug, thiserror::Error)]
#[error("Policy '{policy}' failed to evaluate: {reason}")]
pub struct PolicyError {
    pub policy: String,
    pub reason: String,
}

impl PolicyError {
    pub fn new(policy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
