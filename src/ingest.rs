//! Ingestion boundary.
//!
//! Takes a normalized inbound email from the mail collaborator and runs
//! the full fast path: resolve, classify, security-gate, dispatch, then
//! enqueue for deferred analysis and enrich the tenant hierarchy. A hard
//! timeout bounds the whole dispatch so a stuck downstream call fails the
//! message instead of hanging the pipeline.
//!
//! Sender-visible failure is deliberate: clearly abusive or spoofed
//! traffic gets silence, legitimate-but-misrouted or rate-limited traffic
//! gets a short explanatory notice. Internal detail never leaks out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::{AgentReply, CommandDispatcher, DispatchOutcome};
use crate::error::ResolutionError;
use crate::hierarchy::HierarchyExtractor;
use crate::message::InboundEmail;
use crate::queue::{AnalysisQueue, Priority};
use crate::routing::{AgentAddress, RecipientResolver, VisibilityContext};
use crate::security::ValidationResult;
use crate::store::{Store, Submission, SubmissionOutcome};

/// Fallback organization for shared (tenant-less) inbox traffic.
const SHARED_ORG: &str = "shared";

/// Result of ingesting one message.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Dispatched and queued for analysis.
    Accepted {
        agent: String,
        reply: AgentReply,
        priority: Priority,
    },
    /// A security policy denied the message.
    Rejected {
        decision: ValidationResult,
        notice: Option<String>,
    },
    /// Unroutable: no resolvable service recipient.
    Dropped {
        reason: String,
        notice: Option<String>,
    },
    /// Allowed but the handler failed or timed out.
    Failed { reason: String },
}

/// The inbound fast path, one instance per process.
pub struct IngestService {
    resolver: RecipientResolver,
    dispatchers: HashMap<String, CommandDispatcher>,
    queue: Arc<AnalysisQueue>,
    store: Arc<dyn Store>,
    extractor: HierarchyExtractor,
    /// Hard ceiling on one message's dispatch, timeout included in the
    /// acknowledgment path.
    dispatch_timeout: Duration,
}

impl IngestService {
    pub fn new(
        resolver: RecipientResolver,
        dispatchers: Vec<CommandDispatcher>,
        queue: Arc<AnalysisQueue>,
        store: Arc<dyn Store>,
        dispatch_timeout: Duration,
    ) -> Self {
        let dispatchers = dispatchers
            .into_iter()
            .map(|d| (d.agent_type().to_string(), d))
            .collect();
        Self {
            resolver,
            dispatchers,
            queue,
            store,
            extractor: HierarchyExtractor::new(),
            dispatch_timeout,
        }
    }

    /// Ingest one normalized email end to end.
    pub async fn ingest(&self, email: &InboundEmail) -> IngestOutcome {
        let address = match self.resolver.resolve(email) {
            Ok(address) => address,
            Err(e) => return self.drop_unroutable(email, e),
        };

        let Some(dispatcher) = self.dispatchers.get(&address.agent_type) else {
            // Resolvable type with no registered handler. Treated like an
            // unroutable message, with a notice since the sender is
            // plausibly legitimate.
            warn!(id = %email.id, agent_type = %address.agent_type, "No handler registered");
            return IngestOutcome::Dropped {
                reason: format!("no handler for agent type '{}'", address.agent_type),
                notice: Some(
                    "This address is not currently in service. Please check the recipient."
                        .to_string(),
                ),
            };
        };

        let ctx = VisibilityContext::classify(email, &address.address);

        let outcome =
            match tokio::time::timeout(self.dispatch_timeout, dispatcher.dispatch(email, &address, &ctx))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        id = %email.id,
                        agent = %address.instance_name(),
                        timeout_secs = self.dispatch_timeout.as_secs(),
                        "Dispatch timed out"
                    );
                    self.record(email, &address, SubmissionOutcome::Failed, Some("dispatch timed out"))
                        .await;
                    return IngestOutcome::Failed {
                        reason: "dispatch timed out".into(),
                    };
                }
            };

        match outcome {
            DispatchOutcome::Completed(reply) => {
                let organization = address.tenant.clone().unwrap_or_else(|| SHARED_ORG.into());
                let priority = self.queue.queue_email(email.clone(), &organization);
                self.enrich_hierarchy(email, &ctx, &address, &organization).await;
                self.record(email, &address, SubmissionOutcome::Completed, None).await;
                info!(
                    id = %email.id,
                    agent = %address.instance_name(),
                    priority = priority.as_str(),
                    "Message accepted"
                );
                IngestOutcome::Accepted {
                    agent: address.instance_name(),
                    reply,
                    priority,
                }
            }
            DispatchOutcome::Rejected(decision) => {
                let outcome = if decision.quarantine {
                    SubmissionOutcome::Quarantined
                } else {
                    SubmissionOutcome::Rejected
                };
                self.record(email, &address, outcome, decision.reason.as_deref()).await;
                let notice = rejection_notice(&decision);
                IngestOutcome::Rejected { decision, notice }
            }
            DispatchOutcome::Failed { reason } => {
                self.record(email, &address, SubmissionOutcome::Failed, Some(&reason)).await;
                IngestOutcome::Failed { reason }
            }
        }
    }

    fn drop_unroutable(&self, email: &InboundEmail, error: ResolutionError) -> IngestOutcome {
        info!(id = %email.id, sender = %email.sender, error = %error, "Message dropped as unroutable");
        // Unknown agent types and malformed service addresses look like
        // honest typos; address-less traffic does not.
        let notice = match &error {
            ResolutionError::UnknownAgentType { address, .. }
            | ResolutionError::MalformedAddress { address } => Some(format!(
                "Your message to {address} could not be delivered: the address is not recognized."
            )),
            ResolutionError::NoServiceRecipient { .. } | ResolutionError::AmbiguousTenant { .. } => {
                None
            }
        };
        IngestOutcome::Dropped {
            reason: error.to_string(),
            notice,
        }
    }

    async fn enrich_hierarchy(
        &self,
        email: &InboundEmail,
        ctx: &VisibilityContext,
        address: &AgentAddress,
        organization: &str,
    ) {
        let hints = self.extractor.extract(email, ctx, &address.address);
        if hints.is_empty() {
            return;
        }
        // Best effort: enrichment failures never affect the message.
        let result = async {
            let mut record = self.store.get_hierarchy(organization).await?.unwrap_or_default();
            record.merge(&hints);
            self.store.put_hierarchy(organization, &record).await
        }
        .await;
        if let Err(e) = result {
            warn!(organization = %organization, error = %e, "Hierarchy enrichment failed");
        }
    }

    async fn record(
        &self,
        email: &InboundEmail,
        address: &AgentAddress,
        outcome: SubmissionOutcome,
        detail: Option<&str>,
    ) {
        let submission = Submission {
            id: Uuid::new_v4(),
            external_id: email.external_id.clone(),
            agent: address.instance_name(),
            organization_id: address.tenant.clone(),
            sender: email.sender.clone(),
            subject: email.subject.clone(),
            outcome,
            detail: detail.map(String::from),
            received_at: email.received_at,
        };
        if let Err(e) = self.store.record_submission(&submission).await {
            warn!(id = %email.id, error = %e, "Failed to record submission");
        }
    }
}

/// Sender notice for a denied message, or `None` for silence.
fn rejection_notice(decision: &ValidationResult) -> Option<String> {
    if let Some(rate) = &decision.rate_limit {
        return Some(format!(
            "You have sent too many messages this hour ({} of {} allowed). \
             Please try again after {}.",
            rate.current_count,
            rate.limit,
            rate.resets_at.format("%H:%M UTC")
        ));
    }
    // Quarantined and hard-denied traffic gets silence: replying to
    // spoofed or abusive mail confirms a live address.
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::dispatch::AgentHandler;
    use crate::security::builtin::default_engine;
    use crate::security::{AgentSecurityConfig, ConfigRegistry, RateLimitStatus};
    use crate::store::MemoryStore;

    struct EchoHandler {
        delay: Duration,
    }

    #[async_trait]
    impl AgentHandler for EchoHandler {
        fn agent_type(&self) -> &str {
            "faq"
        }

        async fn process(
            &self,
            email: &InboundEmail,
            _address: &AgentAddress,
            _ctx: &VisibilityContext,
        ) -> anyhow::Result<AgentReply> {
            tokio::time::sleep(self.delay).await;
            Ok(AgentReply::text(format!("re: {}", email.subject)))
        }
    }

    fn service_with(
        configs: Arc<ConfigRegistry>,
        store: Arc<MemoryStore>,
        timeout: Duration,
        delay: Duration,
    ) -> (IngestService, Arc<AnalysisQueue>) {
        let resolver = RecipientResolver::new("agents.example.com", vec!["faq".into()]);
        let dispatcher = CommandDispatcher::new(
            Arc::new(EchoHandler { delay }),
            Arc::new(default_engine()),
            configs,
        );
        let queue = Arc::new(AnalysisQueue::new());
        let service = IngestService::new(
            resolver,
            vec![dispatcher],
            Arc::clone(&queue),
            store,
            timeout,
        );
        (service, queue)
    }

    fn email_to(sender: &str, to: &str) -> InboundEmail {
        InboundEmail::new(
            "<i@mail>",
            sender,
            "Password reset",
            "How do I reset my password?",
            vec![to.into()],
            vec![],
            vec![],
        )
    }

    #[tokio::test]
    async fn accepted_message_is_queued_and_recorded() {
        let store = Arc::new(MemoryStore::new());
        let (service, queue) = service_with(
            Arc::new(ConfigRegistry::new()),
            store.clone(),
            Duration::from_secs(5),
            Duration::ZERO,
        );

        let outcome = service
            .ingest(&email_to("alice@corp.io", "faq+acme@agents.example.com"))
            .await;
        match outcome {
            IngestOutcome::Accepted { agent, reply, .. } => {
                assert_eq!(agent, "faq+acme");
                assert_eq!(reply.body.as_deref(), Some("re: Password reset"));
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
        assert_eq!(queue.len(), 1);

        let submissions = store.recent_submissions("faq+acme", 10).await.unwrap();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].outcome, SubmissionOutcome::Completed);
    }

    #[tokio::test]
    async fn unroutable_message_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let (service, queue) = service_with(
            Arc::new(ConfigRegistry::new()),
            store,
            Duration::from_secs(5),
            Duration::ZERO,
        );

        let outcome = service.ingest(&email_to("alice@corp.io", "alice@other.com")).await;
        assert!(matches!(outcome, IngestOutcome::Dropped { notice: None, .. }));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn unknown_agent_type_gets_a_notice() {
        let store = Arc::new(MemoryStore::new());
        let (service, _queue) = service_with(
            Arc::new(ConfigRegistry::new()),
            store,
            Duration::from_secs(5),
            Duration::ZERO,
        );

        let outcome = service
            .ingest(&email_to("alice@corp.io", "payroll+acme@agents.example.com"))
            .await;
        match outcome {
            IngestOutcome::Dropped { notice, .. } => {
                let notice = notice.expect("misroute should get a notice");
                assert!(notice.contains("not recognized"));
            }
            other => panic!("expected Dropped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blacklisted_sender_is_rejected_silently() {
        let store = Arc::new(MemoryStore::new());
        let configs = Arc::new(ConfigRegistry::new());
        configs
            .upsert(AgentSecurityConfig {
                agent: "faq+acme".into(),
                policies: vec!["domain_blacklist".into()],
                max_requests_per_hour: 0,
                domain_whitelist: vec![],
                domain_blacklist: vec!["spam.com".into()],
                require_trust: false,
            })
            .unwrap();
        let (service, queue) =
            service_with(configs, store.clone(), Duration::from_secs(5), Duration::ZERO);

        let outcome = service
            .ingest(&email_to("x@spam.com", "faq+acme@agents.example.com"))
            .await;
        match outcome {
            IngestOutcome::Rejected { decision, notice } => {
                assert!(!decision.allowed);
                assert!(notice.is_none());
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(queue.is_empty());

        let submissions = store.recent_submissions("faq+acme", 10).await.unwrap();
        assert_eq!(submissions[0].outcome, SubmissionOutcome::Rejected);
    }

    #[tokio::test]
    async fn slow_handler_hits_the_hard_timeout() {
        let store = Arc::new(MemoryStore::new());
        let (service, _queue) = service_with(
            Arc::new(ConfigRegistry::new()),
            store.clone(),
            Duration::from_millis(20),
            Duration::from_secs(10),
        );

        let outcome = service
            .ingest(&email_to("alice@corp.io", "faq+acme@agents.example.com"))
            .await;
        match outcome {
            IngestOutcome::Failed { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected Failed, got {other:?}"),
        }
        let submissions = store.recent_submissions("faq+acme", 10).await.unwrap();
        assert_eq!(submissions[0].outcome, SubmissionOutcome::Failed);
    }

    #[test]
    fn rate_limited_rejection_carries_a_notice() {
        let decision = ValidationResult::deny("rate limit exceeded").with_rate_limit(
            RateLimitStatus {
                current_count: 201,
                limit: 200,
                resets_at: Utc::now(),
            },
        );
        let notice = rejection_notice(&decision).expect("rate limit should get a notice");
        assert!(notice.contains("201 of 200"));
    }
}
