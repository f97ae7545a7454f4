//! Per-agent security configuration.
//!
//! Admins edit these; the engine reads them on every message. The type is
//! validated at the boundary — a malformed config is rejected on load or
//! update, never deep inside policy evaluation.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

/// Window size for the rate-limit policy.
pub const RATE_LIMIT_WINDOW_SECS: i64 = 3600;

/// Per-agent security configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSecurityConfig {
    /// Agent instance this config belongs to (e.g. "faq+acme").
    pub agent: String,
    /// Ordered list of policy names to consider for this agent.
    pub policies: Vec<String>,
    /// Max allowed requests per (sender, agent) per hour. Ignored unless
    /// the rate-limit policy is listed.
    #[serde(default)]
    pub max_requests_per_hour: u32,
    /// Sender domains always allowed (exact or suffix match).
    #[serde(default)]
    pub domain_whitelist: Vec<String>,
    /// Sender domains always blocked (exact or suffix match).
    #[serde(default)]
    pub domain_blacklist: Vec<String>,
    /// Whether an established trust edge is required.
    #[serde(default)]
    pub require_trust: bool,
}

impl AgentSecurityConfig {
    /// Validate the config shape. Called on every load and admin update.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidSecurityConfig {
            agent: self.agent.clone(),
            message,
        };

        if self.agent.trim().is_empty() {
            return Err(invalid("agent name is empty".into()));
        }
        for name in &self.policies {
            if name.trim().is_empty() {
                return Err(invalid("empty policy name in list".into()));
            }
        }
        if self.policies.iter().any(|p| p == "rate_limit") && self.max_requests_per_hour == 0 {
            return Err(invalid(
                "rate_limit policy listed but max_requests_per_hour is 0".into(),
            ));
        }
        for entry in self.domain_whitelist.iter().chain(&self.domain_blacklist) {
            if entry.trim().is_empty() || entry.contains('@') || entry.contains(char::is_whitespace)
            {
                return Err(invalid(format!("invalid domain entry '{entry}'")));
            }
        }
        Ok(())
    }
}

/// In-process registry of per-agent security configs.
///
/// Reads happen on every inbound message; writes come from the admin
/// surface and are persisted by the caller. A plain `RwLock<HashMap>` is
/// enough for single-process semantics — multi-instance deployment would
/// need a shared store (recorded as an open question, not solved here).
pub struct ConfigRegistry {
    configs: RwLock<HashMap<String, AgentSecurityConfig>>,
}

impl ConfigRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry from already-validated configs.
    pub fn with_configs(configs: Vec<AgentSecurityConfig>) -> Result<Self, ConfigError> {
        let registry = Self::new();
        for cfg in configs {
            registry.upsert(cfg)?;
        }
        Ok(registry)
    }

    /// Validate and insert/replace a config.
    pub fn upsert(&self, cfg: AgentSecurityConfig) -> Result<(), ConfigError> {
        cfg.validate()?;
        info!(agent = %cfg.agent, policies = ?cfg.policies, "Security config updated");
        self.configs
            .write()
            .expect("config registry lock poisoned")
            .insert(cfg.agent.clone(), cfg);
        Ok(())
    }

    /// Look up the config for an agent instance.
    pub fn get(&self, agent: &str) -> Option<AgentSecurityConfig> {
        self.configs
            .read()
            .expect("config registry lock poisoned")
            .get(agent)
            .cloned()
    }

    /// Remove a config. Returns whether one existed.
    pub fn remove(&self, agent: &str) -> bool {
        self.configs
            .write()
            .expect("config registry lock poisoned")
            .remove(agent)
            .is_some()
    }

    /// Names of all configured agents.
    pub fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self
            .configs
            .read()
            .expect("config registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        agents.sort();
        agents
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AgentSecurityConfig {
        AgentSecurityConfig {
            agent: "faq+acme".into(),
            policies: vec!["domain_blacklist".into(), "rate_limit".into()],
            max_requests_per_hour: 200,
            domain_whitelist: vec![],
            domain_blacklist: vec!["spam.com".into()],
            require_trust: false,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rate_limit_without_threshold_rejected() {
        let mut cfg = base_config();
        cfg.max_requests_per_hour = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn domain_entry_with_at_sign_rejected() {
        let mut cfg = base_config();
        cfg.domain_blacklist = vec!["x@spam.com".into()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_agent_name_rejected() {
        let mut cfg = base_config();
        cfg.agent = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn registry_rejects_invalid_on_upsert() {
        let registry = ConfigRegistry::new();
        let mut cfg = base_config();
        cfg.policies = vec!["".into()];
        assert!(registry.upsert(cfg).is_err());
        assert!(registry.get("faq+acme").is_none());
    }

    #[test]
    fn registry_roundtrip() {
        let registry = ConfigRegistry::new();
        registry.upsert(base_config()).unwrap();
        let cfg = registry.get("faq+acme").unwrap();
        assert_eq!(cfg.max_requests_per_hour, 200);
        assert_eq!(registry.agents(), vec!["faq+acme".to_string()]);
        assert!(registry.remove("faq+acme"));
        assert!(registry.get("faq+acme").is_none());
    }
}
