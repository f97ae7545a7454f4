//! libSQL store backend.
//!
//! Configs, insights, and hierarchy records are stored as JSON columns;
//! submissions get flat columns so they can be filtered in SQL. Supports
//! local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::hierarchy::HierarchyRecord;
use crate::security::AgentSecurityConfig;
use crate::store::{Store, StoredInsight, Submission, SubmissionOutcome};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS security_configs (
    agent       TEXT PRIMARY KEY,
    config      TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS submissions (
    id              TEXT PRIMARY KEY,
    external_id     TEXT NOT NULL,
    agent           TEXT NOT NULL,
    organization_id TEXT,
    sender          TEXT NOT NULL,
    subject         TEXT NOT NULL,
    outcome         TEXT NOT NULL,
    detail          TEXT,
    received_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_submissions_agent ON submissions(agent, received_at);
CREATE TABLE IF NOT EXISTS insights (
    id              TEXT PRIMARY KEY,
    email_id        TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    priority        TEXT NOT NULL,
    insights        TEXT NOT NULL,
    analyzed_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_insights_org ON insights(organization_id, analyzed_at);
CREATE TABLE IF NOT EXISTS hierarchies (
    organization_id TEXT PRIMARY KEY,
    record          TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
";

/// libSQL-backed [`Store`].
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async
/// use, so a single connection is shared for all operations.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Connection(format!("create database directory: {e}")))?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("connect: {e}")))?;
        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("open in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("connect: {e}")))?;
        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(SCHEMA)
            .await
            .map_err(|e| StoreError::Query(format!("schema init: {e}")))?;
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn query_err(e: libsql::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Parse an RFC 3339 datetime string written by this backend.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Serialization(format!("uuid: {e}")))
}

fn row_to_submission(row: &libsql::Row) -> Result<Submission, StoreError> {
    let id: String = row.get(0).map_err(query_err)?;
    let external_id: String = row.get(1).map_err(query_err)?;
    let agent: String = row.get(2).map_err(query_err)?;
    let organization_id: Option<String> = row.get(3).ok();
    let sender: String = row.get(4).map_err(query_err)?;
    let subject: String = row.get(5).map_err(query_err)?;
    let outcome: String = row.get(6).map_err(query_err)?;
    let detail: Option<String> = row.get(7).ok();
    let received_at: String = row.get(8).map_err(query_err)?;
    Ok(Submission {
        id: parse_uuid(&id)?,
        external_id,
        agent,
        organization_id,
        sender,
        subject,
        outcome: outcome.parse::<SubmissionOutcome>()?,
        detail,
        received_at: parse_datetime(&received_at),
    })
}

#[async_trait]
impl Store for LibSqlStore {
    async fn load_security_configs(&self) -> Result<Vec<AgentSecurityConfig>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT config FROM security_configs", ())
            .await
            .map_err(query_err)?;
        let mut configs = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let raw: String = row.get(0).map_err(query_err)?;
            configs.push(from_json(&raw)?);
        }
        Ok(configs)
    }

    async fn upsert_security_config(
        &self,
        config: &AgentSecurityConfig,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO security_configs (agent, config, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(agent) DO UPDATE SET config = ?2, updated_at = ?3",
                params![
                    config.agent.as_str(),
                    to_json(config)?,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_security_config(
        &self,
        agent: &str,
    ) -> Result<Option<AgentSecurityConfig>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT config FROM security_configs WHERE agent = ?1",
                params![agent],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let raw: String = row.get(0).map_err(query_err)?;
                Ok(Some(from_json(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn record_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO submissions
                 (id, external_id, agent, organization_id, sender, subject, outcome, detail, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    submission.id.to_string(),
                    submission.external_id.as_str(),
                    submission.agent.as_str(),
                    submission.organization_id.as_deref(),
                    submission.sender.as_str(),
                    submission.subject.as_str(),
                    submission.outcome.as_str(),
                    submission.detail.as_deref(),
                    submission.received_at.to_rfc3339()
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn recent_submissions(
        &self,
        agent: &str,
        limit: usize,
    ) -> Result<Vec<Submission>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, external_id, agent, organization_id, sender, subject, outcome, detail, received_at
                 FROM submissions WHERE agent = ?1
                 ORDER BY received_at DESC LIMIT ?2",
                params![agent, limit as i64],
            )
            .await
            .map_err(query_err)?;
        let mut submissions = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            submissions.push(row_to_submission(&row)?);
        }
        Ok(submissions)
    }

    async fn record_insight(&self, insight: &StoredInsight) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO insights (id, email_id, organization_id, priority, insights, analyzed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    insight.id.to_string(),
                    insight.email_id.to_string(),
                    insight.organization_id.as_str(),
                    insight.priority.as_str(),
                    to_json(&insight.insights)?,
                    insight.analyzed_at.to_rfc3339()
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn insights_since(
        &self,
        organization_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredInsight>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, email_id, organization_id, priority, insights, analyzed_at
                 FROM insights WHERE organization_id = ?1 AND analyzed_at >= ?2
                 ORDER BY analyzed_at DESC",
                params![organization_id, since.to_rfc3339()],
            )
            .await
            .map_err(query_err)?;
        let mut insights = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let id: String = row.get(0).map_err(query_err)?;
            let email_id: String = row.get(1).map_err(query_err)?;
            let organization_id: String = row.get(2).map_err(query_err)?;
            let priority: String = row.get(3).map_err(query_err)?;
            let insights_json: String = row.get(4).map_err(query_err)?;
            let analyzed_at: String = row.get(5).map_err(query_err)?;
            insights.push(StoredInsight {
                id: parse_uuid(&id)?,
                email_id: parse_uuid(&email_id)?,
                organization_id,
                priority: from_json(&format!("\"{priority}\""))?,
                insights: from_json(&insights_json)?,
                analyzed_at: parse_datetime(&analyzed_at),
            });
        }
        Ok(insights)
    }

    async fn get_hierarchy(
        &self,
        organization_id: &str,
    ) -> Result<Option<HierarchyRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT record FROM hierarchies WHERE organization_id = ?1",
                params![organization_id],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let raw: String = row.get(0).map_err(query_err)?;
                Ok(Some(from_json(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn put_hierarchy(
        &self,
        organization_id: &str,
        record: &HierarchyRecord,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO hierarchies (organization_id, record, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(organization_id) DO UPDATE SET record = ?2, updated_at = ?3",
                params![organization_id, to_json(record)?, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}
