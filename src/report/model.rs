//! Report types and cache keys.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of report an agent can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Full analysis across all insight dimensions.
    Comprehensive,
    /// Headline + counts only.
    Summary,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comprehensive => "comprehensive",
            Self::Summary => "summary",
        }
    }
}

impl std::str::FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comprehensive" => Ok(Self::Comprehensive),
            "summary" => Ok(Self::Summary),
            other => Err(format!("unknown report kind '{other}'")),
        }
    }
}

/// Cache key: one report per (agent instance, period, kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportKey {
    /// Agent/tenant identifier, e.g. "acme" or "faq+acme".
    pub agent: String,
    /// Reporting period label, e.g. an ISO week like "2025-W10".
    pub period: String,
    /// Report kind.
    pub kind: ReportKind,
}

impl ReportKey {
    pub fn new(agent: impl Into<String>, period: impl Into<String>, kind: ReportKind) -> Self {
        Self {
            agent: agent.into(),
            period: period.into(),
            kind,
        }
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.agent, self.period, self.kind.as_str())
    }
}

/// A generated intelligence report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub key: ReportKey,
    /// One-line summary of the period.
    pub headline: String,
    /// Messages analyzed for this period.
    pub total_messages: usize,
    /// Messages the analysis flagged as urgent.
    pub urgent_messages: usize,
    /// Most frequent topics, most frequent first.
    pub top_topics: Vec<String>,
    /// Extracted action items.
    pub action_items: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display_format() {
        let key = ReportKey::new("acme", "2025-W10", ReportKind::Comprehensive);
        assert_eq!(key.to_string(), "acme/2025-W10/comprehensive");
    }

    #[test]
    fn kind_roundtrip() {
        assert_eq!(
            "comprehensive".parse::<ReportKind>().unwrap(),
            ReportKind::Comprehensive
        );
        assert_eq!("summary".parse::<ReportKind>().unwrap(), ReportKind::Summary);
        assert!("weekly".parse::<ReportKind>().is_err());
    }

    #[test]
    fn keys_hash_by_all_fields() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ReportKey::new("acme", "2025-W10", ReportKind::Summary), 1);
        map.insert(
            ReportKey::new("acme", "2025-W10", ReportKind::Comprehensive),
            2,
        );
        map.insert(ReportKey::new("acme", "2025-W11", ReportKind::Summary), 3);
        assert_eq!(map.len(), 3);
    }
}
