//! Built-in agent handlers.
//!
//! Two agents ship with the service: "faq" answers questions with a
//! topic-aware acknowledgment, and "report" serves cached analysis
//! reports for the sender's organization.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::dispatch::{AgentHandler, AgentReply};
use crate::llm::HeuristicAnalyzer;
use crate::message::InboundEmail;
use crate::report::{ReportKey, ReportKind, ReportService};
use crate::routing::{AgentAddress, VisibilityContext};

/// Answers FAQ-style questions.
pub struct FaqAgent {
    analyzer: HeuristicAnalyzer,
}

impl FaqAgent {
    pub fn new() -> Self {
        Self {
            analyzer: HeuristicAnalyzer::new(),
        }
    }
}

impl Default for FaqAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentHandler for FaqAgent {
    fn agent_type(&self) -> &str {
        "faq"
    }

    async fn process(
        &self,
        email: &InboundEmail,
        _address: &AgentAddress,
        _ctx: &VisibilityContext,
    ) -> anyhow::Result<AgentReply> {
        let insights = self.analyzer.analyze(email);
        let body = if insights.topics.is_empty() {
            "Thanks for your message. Our team will follow up shortly.".to_string()
        } else {
            format!(
                "Thanks for your message about {}. Our team will follow up shortly.",
                insights.topics.join(", ")
            )
        };
        Ok(AgentReply::text(body))
    }
}

/// Serves analysis reports from the cache.
pub struct ReportAgent {
    reports: Arc<ReportService>,
}

impl ReportAgent {
    pub fn new(reports: Arc<ReportService>) -> Self {
        Self { reports }
    }

    /// Current ISO week, the default report period.
    fn current_period() -> String {
        Utc::now().format("%G-W%V").to_string()
    }
}

#[async_trait]
impl AgentHandler for ReportAgent {
    fn agent_type(&self) -> &str {
        "report"
    }

    async fn process(
        &self,
        email: &InboundEmail,
        address: &AgentAddress,
        _ctx: &VisibilityContext,
    ) -> anyhow::Result<AgentReply> {
        let kind = if email.subject.to_lowercase().contains("summary") {
            ReportKind::Summary
        } else {
            ReportKind::Comprehensive
        };
        let key = ReportKey::new(address.instance_name(), Self::current_period(), kind);
        let fetched = self.reports.get_report(&key).await?;

        let report = &fetched.report;
        let mut body = format!("{}\n\n{}\n", report.key.period, report.headline);
        if !report.top_topics.is_empty() {
            body.push_str(&format!("Top topics: {}\n", report.top_topics.join(", ")));
        }
        if !report.action_items.is_empty() {
            body.push_str("Open action items:\n");
            for item in &report.action_items {
                body.push_str(&format!("  - {item}\n"));
            }
        }
        if fetched.is_stale {
            body.push_str("\n(An updated report is being prepared.)\n");
        }
        Ok(AgentReply::text(body))
    }
}
