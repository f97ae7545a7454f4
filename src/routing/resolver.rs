//! Recipient resolver — maps inbound addresses to agent instances.
//!
//! Two address shapes are recognized on the service domain:
//! - `<agentType>+<identifier>@domain` — tenant-scoped instance
//! - `<agentType>@domain` — shared inbox, tenant resolved downstream
//!
//! Resolution is deterministic and fails closed: a message whose
//! recipients never resolve is dropped with a logged reason. We never
//! guess a tenant.

use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::message::InboundEmail;

/// A resolved agent address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAddress {
    /// Agent type, e.g. "faq" or "report".
    pub agent_type: String,
    /// Tenant/organization identifier from the plus-tag, if present.
    pub tenant: Option<String>,
    /// The raw address that resolved, for logging and visibility checks.
    pub address: String,
}

impl AgentAddress {
    /// Instance name used for cache keys and logging:
    /// `faq+acme` for tenant-scoped, `faq` for shared-inbox.
    pub fn instance_name(&self) -> String {
        match &self.tenant {
            Some(t) => format!("{}+{}", self.agent_type, t),
            None => self.agent_type.clone(),
        }
    }
}

/// Resolver for a single service domain and a fixed set of agent types.
#[derive(Debug, Clone)]
pub struct RecipientResolver {
    domain: String,
    agent_types: Vec<String>,
}

impl RecipientResolver {
    /// Create a resolver for `domain` knowing the given agent types.
    pub fn new(domain: impl Into<String>, agent_types: Vec<String>) -> Self {
        Self {
            domain: domain.into().to_lowercase(),
            agent_types: agent_types
                .into_iter()
                .map(|a| a.to_lowercase())
                .collect(),
        }
    }

    /// The service domain this resolver owns.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Resolve the first recipient on the service domain.
    ///
    /// Scans To, then Cc, then Bcc. Recipients off the service domain are
    /// skipped; a recipient on the domain that does not parse to a known
    /// agent fails the whole message (fail closed — no partial guessing).
    pub fn resolve(&self, email: &InboundEmail) -> Result<AgentAddress, ResolutionError> {
        for address in email.all_recipients() {
            let Some((local, domain)) = address.rsplit_once('@') else {
                warn!(address, "Skipping recipient without a domain part");
                continue;
            };
            if domain != self.domain {
                continue;
            }

            let resolved = self.parse_local_part(local, address)?;
            debug!(
                address,
                agent_type = %resolved.agent_type,
                tenant = resolved.tenant.as_deref().unwrap_or("(shared)"),
                "Recipient resolved"
            );
            return Ok(resolved);
        }

        Err(ResolutionError::NoServiceRecipient {
            domain: self.domain.clone(),
        })
    }

    fn parse_local_part(
        &self,
        local: &str,
        address: &str,
    ) -> Result<AgentAddress, ResolutionError> {
        if local.is_empty() {
            return Err(ResolutionError::MalformedAddress {
                address: address.to_string(),
            });
        }

        let (agent_type, tenant) = match local.split_once('+') {
            Some((agent, tag)) => {
                if agent.is_empty() || tag.is_empty() {
                    return Err(ResolutionError::MalformedAddress {
                        address: address.to_string(),
                    });
                }
                (agent.to_string(), Some(tag.to_string()))
            }
            None => (local.to_string(), None),
        };

        if !self.agent_types.iter().any(|a| a == &agent_type) {
            return Err(ResolutionError::UnknownAgentType {
                agent_type,
                address: address.to_string(),
            });
        }

        Ok(AgentAddress {
            agent_type,
            tenant,
            address: address.to_string(),
        })
    }
}
