//! Organizational hierarchy enrichment.
//!
//! Best-effort extraction of department and reporting hints from message
//! traffic, merged additively into a per-tenant [`HierarchyRecord`]. Signals
//! are weak by design; nothing here is authoritative, so merges never
//! destructively overwrite what an earlier message established.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::InboundEmail;
use crate::routing::VisibilityContext;

/// Confidence assigned to a Cc-chain manager hint. Deliberately low: the
/// first Cc is often a manager, but often is not.
const CC_CHAIN_CONFIDENCE: f64 = 0.2;

/// Membership of one department.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepartmentInfo {
    pub members: Vec<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One observed reporting edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub employee: String,
    pub manager: String,
    pub confidence: f64,
    pub last_seen: DateTime<Utc>,
}

/// Per-tenant accumulated hierarchy knowledge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchyRecord {
    pub departments: BTreeMap<String, DepartmentInfo>,
    pub relationships: Vec<Relationship>,
}

impl HierarchyRecord {
    /// Merge extracted hints into this record. Additive and idempotent:
    /// re-merging the same hints changes nothing but timestamps.
    ///
    /// Relationships dedupe on the (employee, manager) pair. The higher
    /// confidence wins; equal confidence keeps the more recent sighting.
    pub fn merge(&mut self, hints: &HierarchyHints) {
        for (name, member) in &hints.department_members {
            let dept = self.departments.entry(name.clone()).or_default();
            if !dept.members.contains(member) {
                dept.members.push(member.clone());
            }
            // Replayed older messages must not move last_seen backwards.
            dept.last_seen = dept.last_seen.max(Some(hints.observed_at));
        }

        for hint in &hints.relationships {
            match self
                .relationships
                .iter_mut()
                .find(|r| r.employee == hint.employee && r.manager == hint.manager)
            {
                Some(existing) => {
                    if hint.confidence > existing.confidence {
                        existing.confidence = hint.confidence;
                        existing.last_seen = hint.last_seen;
                    } else if hint.confidence == existing.confidence {
                        existing.last_seen = existing.last_seen.max(hint.last_seen);
                    }
                }
                None => self.relationships.push(hint.clone()),
            }
        }
    }
}

/// Hints extracted from one message, before merging.
#[derive(Debug, Clone, Default)]
pub struct HierarchyHints {
    /// (department name, member address) pairs.
    pub department_members: Vec<(String, String)>,
    pub relationships: Vec<Relationship>,
    pub observed_at: DateTime<Utc>,
}

impl HierarchyHints {
    pub fn is_empty(&self) -> bool {
        self.department_members.is_empty() && self.relationships.is_empty()
    }
}

/// Extracts hierarchy hints from message patterns.
pub struct HierarchyExtractor {
    dept_tag: Regex,
    subject_marker: Regex,
}

impl HierarchyExtractor {
    pub fn new() -> Self {
        Self {
            // Explicit inline tags: "#dept: engineering".
            dept_tag: Regex::new(r"(?im)^\s*#dept:\s*([a-z][a-z0-9 &/-]{1,40})\s*$").unwrap(),
            // Bracketed subject markers: "[Engineering] sprint notes".
            subject_marker: Regex::new(r"^\s*\[([A-Za-z][A-Za-z0-9 &/-]{1,40})\]").unwrap(),
        }
    }

    /// Pull department and reporting hints out of one message.
    pub fn extract(
        &self,
        email: &InboundEmail,
        ctx: &VisibilityContext,
        agent_address: &str,
    ) -> HierarchyHints {
        let mut hints = HierarchyHints {
            observed_at: email.received_at,
            ..Default::default()
        };

        for cap in self.dept_tag.captures_iter(&email.body) {
            let dept = normalize_department(&cap[1]);
            hints.department_members.push((dept, email.sender.clone()));
        }

        if let Some(cap) = self.subject_marker.captures(&email.subject) {
            let dept = normalize_department(&cap[1]);
            hints.department_members.push((dept, email.sender.clone()));
        }

        // Weak signal: the first human Cc on a direct message is frequently
        // the sender's manager being kept in the loop.
        if ctx.is_to {
            if let Some(cc) = ctx.peer_cc(email, agent_address).first() {
                hints.relationships.push(Relationship {
                    employee: email.sender.clone(),
                    manager: cc.to_string(),
                    confidence: CC_CHAIN_CONFIDENCE,
                    last_seen: email.received_at,
                });
            }
        }

        if !hints.is_empty() {
            debug!(
                sender = %email.sender,
                departments = hints.department_members.len(),
                relationships = hints.relationships.len(),
                "Extracted hierarchy hints"
            );
        }

        hints
    }
}

impl Default for HierarchyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_department(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "faq+acme@agents.example.com";

    fn email_with(subject: &str, body: &str, to: Vec<&str>, cc: Vec<&str>) -> InboundEmail {
        InboundEmail::new(
            "<m@x>",
            "dev@corp.io",
            subject,
            body,
            to.into_iter().map(String::from).collect(),
            cc.into_iter().map(String::from).collect(),
            vec![],
        )
    }

    #[test]
    fn extracts_dept_tag_from_body() {
        let email = email_with(
            "Status",
            "Weekly status below.\n#dept: Engineering\nAll green.",
            vec![AGENT],
            vec![],
        );
        let ctx = VisibilityContext::classify(&email, AGENT);
        let hints = HierarchyExtractor::new().extract(&email, &ctx, AGENT);
        assert_eq!(
            hints.department_members,
            vec![("engineering".to_string(), "dev@corp.io".to_string())]
        );
    }

    #[test]
    fn extracts_bracketed_subject_marker() {
        let email = email_with("[Platform] deploy schedule", "no tags here", vec![AGENT], vec![]);
        let ctx = VisibilityContext::classify(&email, AGENT);
        let hints = HierarchyExtractor::new().extract(&email, &ctx, AGENT);
        assert_eq!(hints.department_members[0].0, "platform");
    }

    #[test]
    fn cc_chain_yields_weak_manager_edge() {
        let email = email_with("Question", "body", vec![AGENT], vec!["boss@corp.io"]);
        let ctx = VisibilityContext::classify(&email, AGENT);
        let hints = HierarchyExtractor::new().extract(&email, &ctx, AGENT);
        assert_eq!(hints.relationships.len(), 1);
        let rel = &hints.relationships[0];
        assert_eq!(rel.employee, "dev@corp.io");
        assert_eq!(rel.manager, "boss@corp.io");
        assert!(rel.confidence < 0.5);
    }

    #[test]
    fn merge_is_idempotent_for_equal_confidence() {
        let now = Utc::now();
        let hint = HierarchyHints {
            department_members: vec![("sales".into(), "amy@corp.io".into())],
            relationships: vec![Relationship {
                employee: "amy@corp.io".into(),
                manager: "lee@corp.io".into(),
                confidence: 0.2,
                last_seen: now,
            }],
            observed_at: now,
        };

        let mut record = HierarchyRecord::default();
        record.merge(&hint);
        record.merge(&hint);

        assert_eq!(record.relationships.len(), 1);
        assert_eq!(record.departments["sales"].members, vec!["amy@corp.io"]);
    }

    #[test]
    fn replayed_older_message_does_not_regress_dept_last_seen() {
        let newer = Utc::now();
        let older = newer - chrono::Duration::hours(6);
        let hints_at = |observed_at| HierarchyHints {
            department_members: vec![("sales".into(), "amy@corp.io".into())],
            relationships: vec![],
            observed_at,
        };

        let mut record = HierarchyRecord::default();
        record.merge(&hints_at(newer));
        record.merge(&hints_at(older));

        assert_eq!(record.departments["sales"].last_seen, Some(newer));
    }

    #[test]
    fn higher_confidence_wins_merge() {
        let now = Utc::now();
        let mut record = HierarchyRecord::default();
        record.merge(&HierarchyHints {
            relationships: vec![Relationship {
                employee: "amy@corp.io".into(),
                manager: "lee@corp.io".into(),
                confidence: 0.2,
                last_seen: now,
            }],
            observed_at: now,
            ..Default::default()
        });
        record.merge(&HierarchyHints {
            relationships: vec![Relationship {
                employee: "amy@corp.io".into(),
                manager: "lee@corp.io".into(),
                confidence: 0.8,
                last_seen: now,
            }],
            observed_at: now,
            ..Default::default()
        });

        assert_eq!(record.relationships.len(), 1);
        assert_eq!(record.relationships[0].confidence, 0.8);

        // A later lower-confidence sighting never downgrades.
        record.merge(&HierarchyHints {
            relationships: vec![Relationship {
                employee: "amy@corp.io".into(),
                manager: "lee@corp.io".into(),
                confidence: 0.2,
                last_seen: now,
            }],
            observed_at: now,
            ..Default::default()
        });
        assert_eq!(record.relationships[0].confidence, 0.8);
    }

    #[test]
    fn equal_confidence_keeps_most_recent_sighting() {
        let earlier = Utc::now() - chrono::Duration::hours(2);
        let later = Utc::now();
        let mut record = HierarchyRecord::default();
        for ts in [earlier, later] {
            record.merge(&HierarchyHints {
                relationships: vec![Relationship {
                    employee: "a@c.io".into(),
                    manager: "b@c.io".into(),
                    confidence: 0.2,
                    last_seen: ts,
                }],
                observed_at: ts,
                ..Default::default()
            });
        }
        assert_eq!(record.relationships[0].last_seen, later);
    }
}
