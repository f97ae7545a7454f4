//! In-memory store backend for tests and local demos.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::hierarchy::HierarchyRecord;
use crate::security::AgentSecurityConfig;
use crate::store::{Store, StoredInsight, Submission};

/// Everything lives in process memory, lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    configs: RwLock<HashMap<String, AgentSecurityConfig>>,
    submissions: RwLock<Vec<Submission>>,
    insights: RwLock<Vec<StoredInsight>>,
    hierarchies: RwLock<HashMap<String, HierarchyRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_security_configs(&self) -> Result<Vec<AgentSecurityConfig>, StoreError> {
        let configs = self.configs.read().unwrap_or_else(|e| e.into_inner());
        Ok(configs.values().cloned().collect())
    }

    async fn upsert_security_config(
        &self,
        config: &AgentSecurityConfig,
    ) -> Result<(), StoreError> {
        let mut configs = self.configs.write().unwrap_or_else(|e| e.into_inner());
        configs.insert(config.agent.clone(), config.clone());
        Ok(())
    }

    async fn get_security_config(
        &self,
        agent: &str,
    ) -> Result<Option<AgentSecurityConfig>, StoreError> {
        let configs = self.configs.read().unwrap_or_else(|e| e.into_inner());
        Ok(configs.get(agent).cloned())
    }

    async fn record_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut submissions = self.submissions.write().unwrap_or_else(|e| e.into_inner());
        submissions.push(submission.clone());
        Ok(())
    }

    async fn recent_submissions(
        &self,
        agent: &str,
        limit: usize,
    ) -> Result<Vec<Submission>, StoreError> {
        let submissions = self.submissions.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<Submission> = submissions
            .iter()
            .filter(|s| s.agent == agent)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn record_insight(&self, insight: &StoredInsight) -> Result<(), StoreError> {
        let mut insights = self.insights.write().unwrap_or_else(|e| e.into_inner());
        insights.push(insight.clone());
        Ok(())
    }

    async fn insights_since(
        &self,
        organization_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredInsight>, StoreError> {
        let insights = self.insights.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<StoredInsight> = insights
            .iter()
            .filter(|i| i.organization_id == organization_id && i.analyzed_at >= since)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
        Ok(matching)
    }

    async fn get_hierarchy(
        &self,
        organization_id: &str,
    ) -> Result<Option<HierarchyRecord>, StoreError> {
        let hierarchies = self.hierarchies.read().unwrap_or_else(|e| e.into_inner());
        Ok(hierarchies.get(organization_id).cloned())
    }

    async fn put_hierarchy(
        &self,
        organization_id: &str,
        record: &HierarchyRecord,
    ) -> Result<(), StoreError> {
        let mut hierarchies = self.hierarchies.write().unwrap_or_else(|e| e.into_inner());
        hierarchies.insert(organization_id.to_string(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use uuid::Uuid;

    use crate::llm::{EmailInsights, InsightSource};
    use crate::queue::Priority;
    use crate::store::SubmissionOutcome;

    fn submission(agent: &str, minutes_ago: i64) -> Submission {
        Submission {
            id: Uuid::new_v4(),
            external_id: format!("<{}@mail>", Uuid::new_v4()),
            agent: agent.into(),
            organization_id: Some("acme".into()),
            sender: "alice@corp.io".into(),
            subject: "subject".into(),
            outcome: SubmissionOutcome::Completed,
            detail: None,
            received_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn config_roundtrip() {
        let store = MemoryStore::new();
        let config = AgentSecurityConfig {
            agent: "faq+acme".into(),
            policies: vec!["rate_limit".into()],
            max_requests_per_hour: 100,
            domain_whitelist: vec![],
            domain_blacklist: vec![],
            require_trust: false,
        };
        store.upsert_security_config(&config).await.unwrap();

        let loaded = store.get_security_config("faq+acme").await.unwrap().unwrap();
        assert_eq!(loaded.max_requests_per_hour, 100);
        assert!(store.get_security_config("other").await.unwrap().is_none());
        assert_eq!(store.load_security_configs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recent_submissions_are_newest_first_and_limited() {
        let store = MemoryStore::new();
        for age in [30, 10, 20] {
            store.record_submission(&submission("faq", age)).await.unwrap();
        }
        store.record_submission(&submission("report", 5)).await.unwrap();

        let recent = store.recent_submissions("faq", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].received_at > recent[1].received_at);
    }

    #[tokio::test]
    async fn insights_filter_by_org_and_cutoff() {
        let store = MemoryStore::new();
        let old = StoredInsight {
            id: Uuid::new_v4(),
            email_id: Uuid::new_v4(),
            organization_id: "acme".into(),
            priority: Priority::Medium,
            insights: EmailInsights {
                summary: "old".into(),
                topics: vec![],
                action_items: vec![],
                urgent: false,
                source: InsightSource::Heuristic,
            },
            analyzed_at: Utc::now() - chrono::Duration::days(10),
        };
        let fresh = StoredInsight {
            analyzed_at: Utc::now(),
            insights: EmailInsights {
                summary: "fresh".into(),
                ..old.insights.clone()
            },
            id: Uuid::new_v4(),
            ..old.clone()
        };
        store.record_insight(&old).await.unwrap();
        store.record_insight(&fresh).await.unwrap();

        let since = Utc::now() - chrono::Duration::days(7);
        let result = store.insights_since("acme", since).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].insights.summary, "fresh");
        assert!(store.insights_since("other", since).await.unwrap().is_empty());
    }
}
