//! The `SecurityPolicy` trait and its decision type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::message::InboundEmail;
use crate::routing::VisibilityContext;
use crate::security::config::AgentSecurityConfig;

/// The single decision propagated to callers of the engine.
///
/// Invariant: `allowed = false` always carries a reason. The constructors
/// below are the only way the built-ins build one, which keeps that true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub allowed: bool,
    pub reason: Option<String>,
    /// Soft-block: hold for human review instead of silently dropping.
    pub quarantine: bool,
    /// Present when a rate-limit policy produced the decision.
    pub rate_limit: Option<RateLimitStatus>,
    /// Policy-specific extras (e.g. content-scan match counts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ValidationResult {
    /// Message may proceed.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            quarantine: false,
            rate_limit: None,
            metadata: None,
        }
    }

    /// Hard deny with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            quarantine: false,
            rate_limit: None,
            metadata: None,
        }
    }

    /// Deny but quarantine for review rather than drop.
    pub fn quarantined(reason: impl Into<String>) -> Self {
        Self {
            quarantine: true,
            ..Self::deny(reason)
        }
    }

    /// Attach rate-limit detail to a decision.
    pub fn with_rate_limit(mut self, status: RateLimitStatus) -> Self {
        self.rate_limit = Some(status);
        self
    }

    /// Attach arbitrary metadata to a decision.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Rate-limit state surfaced with a denial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Requests counted in the current window, including this one.
    pub current_count: u32,
    /// Configured maximum per window.
    pub limit: u32,
    /// When the window resets.
    pub resets_at: DateTime<Utc>,
}

/// A named, prioritized predicate + validator.
///
/// Policies may hold internal state (counters, trust edges) behind their
/// own locks; `validate` itself is a synchronous, non-preemptible step so
/// evaluation order is race-free within one process.
pub trait SecurityPolicy: Send + Sync {
    /// Stable policy name referenced from `AgentSecurityConfig.policies`.
    fn name(&self) -> &'static str;

    /// Evaluation priority — higher runs first. Ties keep registration
    /// order.
    fn priority(&self) -> i32;

    /// Whether this policy applies to the given message for this agent.
    fn should_apply(
        &self,
        email: &InboundEmail,
        ctx: &VisibilityContext,
        cfg: &AgentSecurityConfig,
    ) -> bool;

    /// Evaluate the message. An `Err` is mapped by the engine to a
    /// deny-and-quarantine decision (fail-safe-closed).
    fn validate(
        &self,
        email: &InboundEmail,
        ctx: &VisibilityContext,
        cfg: &AgentSecurityConfig,
    ) -> Result<ValidationResult, PolicyError>;
}
