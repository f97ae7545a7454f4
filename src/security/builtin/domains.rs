//! Domain allow/deny policies.
//!
//! The blacklist carries a higher priority than the whitelist so an
//! explicit block always wins, even when the sender would also match an
//! allow entry.

use tracing::debug;

use crate::error::PolicyError;
use crate::message::InboundEmail;
use crate::routing::VisibilityContext;
use crate::security::builtin::domain_matches;
use crate::security::config::AgentSecurityConfig;
use crate::security::policy::{SecurityPolicy, ValidationResult};

/// Denies senders whose domain matches a deny-list entry.
pub struct DomainBlacklistPolicy;

impl DomainBlacklistPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DomainBlacklistPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityPolicy for DomainBlacklistPolicy {
    fn name(&self) -> &'static str {
        "domain_blacklist"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn should_apply(
        &self,
        _email: &InboundEmail,
        _ctx: &VisibilityContext,
        cfg: &AgentSecurityConfig,
    ) -> bool {
        !cfg.domain_blacklist.is_empty()
    }

    fn validate(
        &self,
        email: &InboundEmail,
        _ctx: &VisibilityContext,
        cfg: &AgentSecurityConfig,
    ) -> Result<ValidationResult, PolicyError> {
        let Some(domain) = email.sender_domain() else {
            // A sender with no domain part never matches an allow list
            // either; treat it as blocked rather than guessing.
            return Ok(ValidationResult::deny("sender address has no domain"));
        };

        if let Some(entry) = cfg
            .domain_blacklist
            .iter()
            .find(|entry| domain_matches(domain, entry))
        {
            debug!(sender = %email.sender, entry = %entry, "Sender domain is deny-listed");
            return Ok(ValidationResult::deny(format!(
                "sender domain '{domain}' is blocked"
            )));
        }

        Ok(ValidationResult::allow())
    }
}

/// Allows only senders whose domain matches an allow-list entry.
pub struct DomainWhitelistPolicy;

impl DomainWhitelistPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DomainWhitelistPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityPolicy for DomainWhitelistPolicy {
    fn name(&self) -> &'static str {
        "domain_whitelist"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn should_apply(
        &self,
        _email: &InboundEmail,
        _ctx: &VisibilityContext,
        cfg: &AgentSecurityConfig,
    ) -> bool {
        !cfg.domain_whitelist.is_empty()
    }

    fn validate(
        &self,
        email: &InboundEmail,
        _ctx: &VisibilityContext,
        cfg: &AgentSecurityConfig,
    ) -> Result<ValidationResult, PolicyError> {
        let Some(domain) = email.sender_domain() else {
            return Ok(ValidationResult::deny("sender address has no domain"));
        };

        if cfg
            .domain_whitelist
            .iter()
            .any(|entry| domain_matches(domain, entry))
        {
            return Ok(ValidationResult::allow());
        }

        debug!(sender = %email.sender, "Sender domain not on the allow list");
        Ok(ValidationResult::deny(format!(
            "sender domain '{domain}' is not on the allow list"
        )))
    }
}
