//! Persistence boundary.
//!
//! A backend-agnostic [`Store`] trait covering agent security configs,
//! submission records, analysis insights, and hierarchy records, with a
//! libSQL backend for deployment and an in-memory backend for tests.

pub mod libsql_backend;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::hierarchy::HierarchyRecord;
use crate::llm::EmailInsights;
use crate::queue::Priority;
use crate::security::AgentSecurityConfig;

pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;

/// Terminal state of one dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Completed,
    Rejected,
    Quarantined,
    Failed,
}

impl SubmissionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Quarantined => "quarantined",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for SubmissionOutcome {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            "quarantined" => Ok(Self::Quarantined),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::Serialization(format!(
                "unknown submission outcome '{other}'"
            ))),
        }
    }
}

/// Audit record of one dispatched inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub external_id: String,
    pub agent: String,
    pub organization_id: Option<String>,
    pub sender: String,
    pub subject: String,
    pub outcome: SubmissionOutcome,
    pub detail: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Persisted analysis result for one email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredInsight {
    pub id: Uuid,
    pub email_id: Uuid,
    pub organization_id: String,
    pub priority: Priority,
    pub insights: EmailInsights,
    pub analyzed_at: DateTime<Utc>,
}

/// Backend-agnostic persistence trait.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Security configs ────────────────────────────────────────────

    /// Load every stored per-agent security config.
    async fn load_security_configs(&self) -> Result<Vec<AgentSecurityConfig>, StoreError>;

    /// Insert or replace one agent's security config.
    async fn upsert_security_config(&self, config: &AgentSecurityConfig)
    -> Result<(), StoreError>;

    /// Fetch one agent's security config.
    async fn get_security_config(
        &self,
        agent: &str,
    ) -> Result<Option<AgentSecurityConfig>, StoreError>;

    // ── Submissions ─────────────────────────────────────────────────

    /// Record the outcome of one dispatched message.
    async fn record_submission(&self, submission: &Submission) -> Result<(), StoreError>;

    /// Most recent submissions for one agent, newest first.
    async fn recent_submissions(
        &self,
        agent: &str,
        limit: usize,
    ) -> Result<Vec<Submission>, StoreError>;

    // ── Insights ────────────────────────────────────────────────────

    /// Persist an analysis result.
    async fn record_insight(&self, insight: &StoredInsight) -> Result<(), StoreError>;

    /// Insights for one organization since a cutoff, newest first.
    async fn insights_since(
        &self,
        organization_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredInsight>, StoreError>;

    // ── Hierarchy ───────────────────────────────────────────────────

    /// Load one organization's hierarchy record.
    async fn get_hierarchy(
        &self,
        organization_id: &str,
    ) -> Result<Option<HierarchyRecord>, StoreError>;

    /// Replace one organization's hierarchy record.
    async fn put_hierarchy(
        &self,
        organization_id: &str,
        record: &HierarchyRecord,
    ) -> Result<(), StoreError>;
}
