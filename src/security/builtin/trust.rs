//! Trust-relationship policy.
//!
//! Requires an established trust edge between sender and agent. A missing
//! edge quarantines rather than drops, so a human can review first
//! contact instead of the sender silently disappearing.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::debug;

use crate::error::PolicyError;
use crate::message::InboundEmail;
use crate::routing::VisibilityContext;
use crate::security::config::AgentSecurityConfig;
use crate::security::policy::{SecurityPolicy, ValidationResult};

/// Policy gating on (sender, agent) trust edges.
pub struct TrustRelationshipPolicy {
    edges: Mutex<HashSet<(String, String)>>,
}

impl TrustRelationshipPolicy {
    pub fn new() -> Self {
        Self {
            edges: Mutex::new(HashSet::new()),
        }
    }

    /// Establish a trust edge.
    pub fn grant(&self, sender: &str, agent: &str) {
        self.edges
            .lock()
            .expect("trust edges lock poisoned")
            .insert((sender.to_lowercase(), agent.to_string()));
    }

    /// Remove a trust edge. Returns whether one existed.
    pub fn revoke(&self, sender: &str, agent: &str) -> bool {
        self.edges
            .lock()
            .expect("trust edges lock poisoned")
            .remove(&(sender.to_lowercase(), agent.to_string()))
    }

    fn is_trusted(&self, sender: &str, agent: &str) -> bool {
        self.edges
            .lock()
            .expect("trust edges lock poisoned")
            .contains(&(sender.to_lowercase(), agent.to_string()))
    }
}

impl Default for TrustRelationshipPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityPolicy for TrustRelationshipPolicy {
    fn name(&self) -> &'static str {
        "trust_relationship"
    }

    fn priority(&self) -> i32 {
        60
    }

    fn should_apply(
        &self,
        _email: &InboundEmail,
        _ctx: &VisibilityContext,
        cfg: &AgentSecurityConfig,
    ) -> bool {
        cfg.require_trust
    }

    fn validate(
        &self,
        email: &InboundEmail,
        _ctx: &VisibilityContext,
        cfg: &AgentSecurityConfig,
    ) -> Result<ValidationResult, PolicyError> {
        if self.is_trusted(&email.sender, &cfg.agent) {
            return Ok(ValidationResult::allow());
        }
        debug!(sender = %email.sender, agent = %cfg.agent, "No trust edge — quarantining");
        Ok(ValidationResult::quarantined(format!(
            "no established trust relationship between {} and {}",
            email.sender, cfg.agent
        )))
    }
}
