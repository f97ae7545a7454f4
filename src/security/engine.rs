//! Security policy engine — ordered evaluation with short-circuit deny.
//!
//! Pure evaluation pipeline, no persistent state machine of its own:
//! 1. no config for the agent ⇒ default-allow (a documented permissive
//!    default, flagged as an open question in DESIGN.md);
//! 2. configured policy names are resolved against the registry and
//!    filtered through `should_apply`;
//! 3. applicable policies run in descending priority, ties keeping
//!    registration order;
//! 4. the first deny short-circuits; an `Err` from `validate` becomes
//!    deny + quarantine (a security check must never open-fail).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::message::InboundEmail;
use crate::routing::VisibilityContext;
use crate::security::config::AgentSecurityConfig;
use crate::security::policy::{SecurityPolicy, ValidationResult};

/// Registry + evaluator for security policies.
pub struct PolicyEngine {
    /// Registration order doubles as the priority tiebreak.
    policies: Vec<Arc<dyn SecurityPolicy>>,
}

impl PolicyEngine {
    /// Create an engine with no policies registered.
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// Register a policy. Later registrations lose priority ties to
    /// earlier ones.
    pub fn register(&mut self, policy: Arc<dyn SecurityPolicy>) {
        debug!(policy = policy.name(), priority = policy.priority(), "Policy registered");
        self.policies.push(policy);
    }

    /// Look up a registered policy by name.
    pub fn policy(&self, name: &str) -> Option<&Arc<dyn SecurityPolicy>> {
        self.policies.iter().find(|p| p.name() == name)
    }

    /// Evaluate the configured chain for one message.
    ///
    /// `config = None` means the agent has no security configuration at
    /// all, which is a documented default-allow.
    pub fn validate_request(
        &self,
        email: &InboundEmail,
        ctx: &VisibilityContext,
        config: Option<&AgentSecurityConfig>,
    ) -> ValidationResult {
        let Some(cfg) = config else {
            debug!(id = %email.id, "No security config for agent — default allow");
            return ValidationResult::allow();
        };

        // Resolve configured names against the registry, keeping
        // registration index for the stable tiebreak.
        let mut applicable: Vec<(usize, &Arc<dyn SecurityPolicy>)> = Vec::new();
        for name in &cfg.policies {
            let Some((idx, policy)) = self
                .policies
                .iter()
                .enumerate()
                .find(|(_, p)| p.name() == name)
            else {
                warn!(agent = %cfg.agent, policy = %name, "Configured policy is not registered — skipping");
                continue;
            };
            if applicable.iter().any(|(i, _)| *i == idx) {
                continue;
            }
            if policy.should_apply(email, ctx, cfg) {
                applicable.push((idx, policy));
            }
        }

        // Descending priority, registration order on ties (never the
        // order names happen to appear in the config list).
        applicable.sort_by_key(|(idx, p)| (std::cmp::Reverse(p.priority()), *idx));

        for (_, policy) in &applicable {
            let result = match policy.validate(email, ctx, cfg) {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        id = %email.id,
                        agent = %cfg.agent,
                        policy = policy.name(),
                        error = %e,
                        "Policy evaluation failed — failing closed"
                    );
                    return ValidationResult::quarantined(format!(
                        "security check '{}' could not be evaluated",
                        policy.name()
                    ));
                }
            };
            if !result.allowed {
                debug!(
                    id = %email.id,
                    agent = %cfg.agent,
                    policy = policy.name(),
                    quarantine = result.quarantine,
                    "Message denied by policy"
                );
                return result;
            }
        }

        ValidationResult::allow()
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::PolicyError;
    use crate::security::builtin::default_engine;

    /// Fixed-outcome policy for ordering tests.
    struct FixedPolicy {
        name: &'static str,
        priority: i32,
        outcome: fn() -> Result<ValidationResult, PolicyError>,
    }

    impl SecurityPolicy for FixedPolicy {
        fn name(&self) -> &'static str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn should_apply(
            &self,
            _email: &InboundEmail,
            _ctx: &VisibilityContext,
            _cfg: &AgentSecurityConfig,
        ) -> bool {
            true
        }
        fn validate(
            &self,
            _email: &InboundEmail,
            _ctx: &VisibilityContext,
            _cfg: &AgentSecurityConfig,
        ) -> Result<ValidationResult, PolicyError> {
            (self.outcome)()
        }
    }

    fn email() -> InboundEmail {
        InboundEmail::new(
            "<e@mail>",
            "x@spam.com",
            "subject",
            "body",
            vec!["faq@agents.example.com".into()],
            vec![],
            vec![],
        )
    }

    fn ctx(e: &InboundEmail) -> VisibilityContext {
        VisibilityContext::classify(e, "faq@agents.example.com")
    }

    fn cfg(policies: Vec<&str>) -> AgentSecurityConfig {
        AgentSecurityConfig {
            agent: "faq".into(),
            policies: policies.into_iter().map(String::from).collect(),
            max_requests_per_hour: 0,
            domain_whitelist: vec!["good.com".into()],
            domain_blacklist: vec!["spam.com".into()],
            require_trust: false,
        }
    }

    #[test]
    fn missing_config_is_default_allow() {
        let engine = default_engine();
        let e = email();
        let result = engine.validate_request(&e, &ctx(&e), None);
        assert!(result.allowed);
    }

    #[test]
    fn empty_policy_list_allows() {
        let engine = default_engine();
        let e = email();
        let result = engine.validate_request(&e, &ctx(&e), Some(&cfg(vec![])));
        assert!(result.allowed);
    }

    #[test]
    fn highest_priority_deny_wins_regardless_of_config_order() {
        // Whitelist listed first in config; blacklist still decides
        // because priority ordering, not config order, drives evaluation.
        let engine = default_engine();
        let e = email(); // sender x@spam.com
        let config = cfg(vec!["domain_whitelist", "domain_blacklist"]);
        let result = engine.validate_request(&e, &ctx(&e), Some(&config));
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("blocked"));
    }

    #[test]
    fn blacklist_wins_even_without_whitelist_match() {
        let engine = default_engine();
        let e = email();
        let config = cfg(vec!["domain_blacklist", "domain_whitelist"]);
        let result = engine.validate_request(&e, &ctx(&e), Some(&config));
        assert!(!result.allowed);
        // Denied by the blacklist, not by the whitelist fallthrough.
        assert!(result.reason.unwrap().contains("'spam.com' is blocked"));
    }

    #[test]
    fn unknown_policy_names_are_skipped() {
        let engine = default_engine();
        let e = email();
        let mut config = cfg(vec!["no_such_policy"]);
        config.domain_blacklist = vec![];
        let result = engine.validate_request(&e, &ctx(&e), Some(&config));
        assert!(result.allowed);
    }

    #[test]
    fn validate_error_fails_closed() {
        let mut engine = PolicyEngine::new();
        engine.register(Arc::new(FixedPolicy {
            name: "broken",
            priority: 10,
            outcome: || Err(PolicyError::new("broken", "backing store unavailable")),
        }));
        let e = email();
        let mut config = cfg(vec!["broken"]);
        config.domain_blacklist = vec![];
        config.domain_whitelist = vec![];

        let result = engine.validate_request(&e, &ctx(&e), Some(&config));
        assert!(!result.allowed);
        assert!(result.quarantine);
    }

    #[test]
    fn ties_keep_registration_order() {
        // Two same-priority policies, both denying with distinct reasons,
        // listed in the config in reverse registration order. The first
        // registered policy must still decide.
        let mut engine = PolicyEngine::new();
        engine.register(Arc::new(FixedPolicy {
            name: "first",
            priority: 10,
            outcome: || Ok(ValidationResult::deny("first says no")),
        }));
        engine.register(Arc::new(FixedPolicy {
            name: "second",
            priority: 10,
            outcome: || Ok(ValidationResult::deny("second says no")),
        }));
        let e = email();
        let mut config = cfg(vec!["second", "first"]);
        config.domain_blacklist = vec![];
        config.domain_whitelist = vec![];

        let result = engine.validate_request(&e, &ctx(&e), Some(&config));
        assert!(!result.allowed);
        assert_eq!(result.reason.as_deref(), Some("first says no"));
    }

    #[test]
    fn short_circuits_on_first_deny() {
        use std::sync::atomic::{AtomicBool, Ordering};
        static LOW_RAN: AtomicBool = AtomicBool::new(false);

        struct Recording;
        impl SecurityPolicy for Recording {
            fn name(&self) -> &'static str {
                "recording"
            }
            fn priority(&self) -> i32 {
                1
            }
            fn should_apply(
                &self,
                _e: &InboundEmail,
                _c: &VisibilityContext,
                _cfg: &AgentSecurityConfig,
            ) -> bool {
                true
            }
            fn validate(
                &self,
                _e: &InboundEmail,
                _c: &VisibilityContext,
                _cfg: &AgentSecurityConfig,
            ) -> Result<ValidationResult, PolicyError> {
                LOW_RAN.store(true, Ordering::SeqCst);
                Ok(ValidationResult::allow())
            }
        }

        let mut engine = PolicyEngine::new();
        engine.register(Arc::new(FixedPolicy {
            name: "denier",
            priority: 100,
            outcome: || Ok(ValidationResult::deny("no")),
        }));
        engine.register(Arc::new(Recording));

        let e = email();
        let mut config = cfg(vec!["denier", "recording"]);
        config.domain_blacklist = vec![];
        config.domain_whitelist = vec![];

        let result = engine.validate_request(&e, &ctx(&e), Some(&config));
        assert!(!result.allowed);
        assert!(!LOW_RAN.load(Ordering::SeqCst));
    }
}
