//! Command dispatcher — security-gated decoration of agent handlers.
//!
//! The dispatcher wraps an agent's raw handler behind the policy engine:
//! only `allowed = true` reaches `process`/`handle_followup`. Rejections
//! come back as a structured outcome carrying quarantine/rate-limit
//! detail; nothing the handler does can escape as a panic or error — the
//! caller always gets a tagged `DispatchOutcome`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::message::InboundEmail;
use crate::routing::{AgentAddress, VisibilityContext};
use crate::security::{ConfigRegistry, PolicyEngine, ValidationResult};

/// What an agent produced for an allowed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    /// Reply body for the sender, if the agent chose to answer.
    pub body: Option<String>,
    /// Free-form handler output for downstream consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AgentReply {
    /// A reply with a body.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            metadata: None,
        }
    }

    /// Handled without replying.
    pub fn silent() -> Self {
        Self {
            body: None,
            metadata: None,
        }
    }
}

/// An agent's raw message handler — business logic only, no gating.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Agent type this handler serves, e.g. "faq".
    fn agent_type(&self) -> &str;

    /// Handle a fresh message.
    async fn process(
        &self,
        email: &InboundEmail,
        address: &AgentAddress,
        ctx: &VisibilityContext,
    ) -> anyhow::Result<AgentReply>;

    /// Handle a message continuing an existing thread.
    ///
    /// Defaults to `process` — most agents treat followups the same way.
    async fn handle_followup(
        &self,
        email: &InboundEmail,
        address: &AgentAddress,
        ctx: &VisibilityContext,
    ) -> anyhow::Result<AgentReply> {
        self.process(email, address, ctx).await
    }
}

/// Result of dispatching one message to one agent.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Security allowed it and the handler completed.
    Completed(AgentReply),
    /// A policy denied the message. Carries the full decision.
    Rejected(ValidationResult),
    /// Security allowed it but the handler failed. The failure is
    /// contained here, never propagated as an error.
    Failed { reason: String },
}

impl DispatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Security-gated wrapper around one agent handler.
///
/// Built once at construction time as an explicit decorator chain —
/// the engine and config registry are injected, not discovered.
pub struct CommandDispatcher {
    handler: Arc<dyn AgentHandler>,
    engine: Arc<PolicyEngine>,
    configs: Arc<ConfigRegistry>,
}

impl CommandDispatcher {
    pub fn new(
        handler: Arc<dyn AgentHandler>,
        engine: Arc<PolicyEngine>,
        configs: Arc<ConfigRegistry>,
    ) -> Self {
        Self {
            handler,
            engine,
            configs,
        }
    }

    /// The agent type this dispatcher fronts.
    pub fn agent_type(&self) -> &str {
        self.handler.agent_type()
    }

    /// Gate and dispatch one resolved message.
    pub async fn dispatch(
        &self,
        email: &InboundEmail,
        address: &AgentAddress,
        ctx: &VisibilityContext,
    ) -> DispatchOutcome {
        // Config lookup is by instance first ("faq+acme"), then by bare
        // agent type so a shared config can cover all tenants.
        let instance = address.instance_name();
        let config = self
            .configs
            .get(&instance)
            .or_else(|| self.configs.get(&address.agent_type));

        let decision = self.engine.validate_request(email, ctx, config.as_ref());
        if !decision.allowed {
            info!(
                id = %email.id,
                agent = %instance,
                quarantine = decision.quarantine,
                reason = decision.reason.as_deref().unwrap_or("(none)"),
                "Message rejected by security policy"
            );
            return DispatchOutcome::Rejected(decision);
        }

        let handled = if email.is_followup() {
            self.handler.handle_followup(email, address, ctx).await
        } else {
            self.handler.process(email, address, ctx).await
        };

        match handled {
            Ok(reply) => {
                info!(id = %email.id, agent = %instance, "Message handled");
                DispatchOutcome::Completed(reply)
            }
            Err(e) => {
                error!(id = %email.id, agent = %instance, error = %e, "Agent handler failed");
                DispatchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
