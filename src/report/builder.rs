//! Report construction from stored insights.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::debug;

use crate::error::AnalysisError;
use crate::report::model::{Report, ReportKey, ReportKind};
use crate::report::service::ReportBuilder;
use crate::store::Store;

/// How far back a report looks, per kind.
fn lookback(kind: ReportKind) -> ChronoDuration {
    match kind {
        ReportKind::Comprehensive => ChronoDuration::days(7),
        ReportKind::Summary => ChronoDuration::days(1),
    }
}

/// Builds reports by aggregating the insights the analysis worker stored.
pub struct InsightReportBuilder {
    store: Arc<dyn Store>,
}

impl InsightReportBuilder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReportBuilder for InsightReportBuilder {
    async fn build(&self, key: &ReportKey) -> Result<Report, AnalysisError> {
        // Keys carry the agent instance ("report+acme"); insights are
        // stored per organization.
        let organization = key
            .agent
            .split_once('+')
            .map(|(_, tenant)| tenant)
            .unwrap_or(key.agent.as_str());

        let since = Utc::now() - lookback(key.kind);
        let insights = self.store.insights_since(organization, since).await?;
        debug!(key = %key, organization, count = insights.len(), "Building report");

        let total_messages = insights.len();
        let urgent_messages = insights.iter().filter(|i| i.insights.urgent).count();

        let mut topic_counts: HashMap<&str, usize> = HashMap::new();
        for insight in &insights {
            for topic in &insight.insights.topics {
                *topic_counts.entry(topic.as_str()).or_default() += 1;
            }
        }
        let mut top_topics: Vec<(&str, usize)> = topic_counts.into_iter().collect();
        top_topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let top_topics: Vec<String> =
            top_topics.into_iter().take(5).map(|(t, _)| t.to_string()).collect();

        let action_items: Vec<String> = insights
            .iter()
            .flat_map(|i| i.insights.action_items.iter().cloned())
            .take(10)
            .collect();

        let headline = if total_messages == 0 {
            format!("No messages analyzed for {} in period {}", organization, key.period)
        } else {
            format!(
                "{total_messages} messages analyzed, {urgent_messages} urgent{}",
                top_topics
                    .first()
                    .map(|t| format!(", top topic: {t}"))
                    .unwrap_or_default()
            )
        };

        Ok(Report {
            key: key.clone(),
            headline,
            total_messages,
            urgent_messages,
            top_topics,
            action_items,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use uuid::Uuid;

    use crate::llm::{EmailInsights, InsightSource};
    use crate::queue::Priority;
    use crate::store::{MemoryStore, Store, StoredInsight};

    fn insight(org: &str, topics: Vec<&str>, urgent: bool) -> StoredInsight {
        StoredInsight {
            id: Uuid::new_v4(),
            email_id: Uuid::new_v4(),
            organization_id: org.into(),
            priority: Priority::Medium,
            insights: EmailInsights {
                summary: "s".into(),
                topics: topics.into_iter().map(String::from).collect(),
                action_items: vec!["follow up".into()],
                urgent,
                source: InsightSource::Heuristic,
            },
            analyzed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn aggregates_counts_and_topics() {
        let store = Arc::new(MemoryStore::new());
        store.record_insight(&insight("acme", vec!["billing"], true)).await.unwrap();
        store.record_insight(&insight("acme", vec!["billing", "support"], false)).await.unwrap();
        store.record_insight(&insight("other", vec!["sales"], false)).await.unwrap();

        let builder = InsightReportBuilder::new(store);
        let key = ReportKey::new("report+acme", "2025-W10", ReportKind::Comprehensive);
        let report = builder.build(&key).await.unwrap();

        assert_eq!(report.total_messages, 2);
        assert_eq!(report.urgent_messages, 1);
        assert_eq!(report.top_topics[0], "billing");
        assert_eq!(report.action_items.len(), 2);
        assert!(report.headline.contains("2 messages"));
    }

    #[tokio::test]
    async fn empty_period_still_builds() {
        let builder = InsightReportBuilder::new(Arc::new(MemoryStore::new()));
        let key = ReportKey::new("report+acme", "2025-W10", ReportKind::Summary);
        let report = builder.build(&key).await.unwrap();
        assert_eq!(report.total_messages, 0);
        assert!(report.headline.contains("No messages"));
    }

    #[tokio::test]
    async fn bare_agent_key_uses_agent_as_organization() {
        let store = Arc::new(MemoryStore::new());
        store.record_insight(&insight("report", vec![], false)).await.unwrap();
        let builder = InsightReportBuilder::new(store);
        let key = ReportKey::new("report", "2025-W10", ReportKind::Summary);
        let report = builder.build(&key).await.unwrap();
        assert_eq!(report.total_messages, 1);
    }
}
