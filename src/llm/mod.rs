//! Intelligence-provider boundary.
//!
//! The core sends a bounded, redacted payload to an external provider and
//! expects structured insights back. Every call path degrades to the
//! deterministic [`heuristics`] analyzer, so the pipeline keeps working
//! without the provider.

pub mod heuristics;
pub mod openai;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ProviderError;
use crate::message::InboundEmail;

pub use heuristics::HeuristicAnalyzer;
pub use openai::OpenAiInsightProvider;

/// Maximum characters of email content sent to a provider.
pub const MAX_PAYLOAD_CHARS: usize = 4_000;

/// Where an insights result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    Provider,
    Heuristic,
}

/// Structured analysis result for one email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailInsights {
    /// One-sentence summary.
    pub summary: String,
    /// Detected topics, most relevant first.
    pub topics: Vec<String>,
    /// Concrete action items extracted from the body.
    pub action_items: Vec<String>,
    /// Whether the message signals urgency.
    pub urgent: bool,
    pub source: InsightSource,
}

/// A single-email analyzer.
#[async_trait]
pub trait InsightProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, email: &InboundEmail) -> Result<EmailInsights, ProviderError>;
}

/// Build the bounded, redacted payload sent over the wire.
///
/// Addresses and long digit runs are masked before anything leaves the
/// process, then the whole thing is truncated to [`MAX_PAYLOAD_CHARS`].
pub fn redacted_payload(email: &InboundEmail) -> String {
    // Static patterns, compiled per call; analysis runs off the hot path.
    let address = Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap();
    let digits = Regex::new(r"\d{6,}").unwrap();

    let raw = format!("Subject: {}\n\n{}", email.subject, email.body);
    let masked = address.replace_all(&raw, "[address]");
    let masked = digits.replace_all(&masked, "[number]");

    let mut payload = masked.into_owned();
    if payload.len() > MAX_PAYLOAD_CHARS {
        let mut cut = MAX_PAYLOAD_CHARS;
        while !payload.is_char_boundary(cut) {
            cut -= 1;
        }
        payload.truncate(cut);
    }
    payload
}

/// Provider with a built-in retry and heuristic fallback.
///
/// Transient failures are retried exactly once; any remaining failure
/// falls back to the deterministic analyzer, which cannot fail.
pub struct FallbackProvider {
    primary: Option<Box<dyn InsightProvider>>,
    heuristics: HeuristicAnalyzer,
}

impl FallbackProvider {
    pub fn new(primary: Option<Box<dyn InsightProvider>>) -> Self {
        Self {
            primary,
            heuristics: HeuristicAnalyzer::new(),
        }
    }

    /// Analyze one email, never failing.
    pub async fn analyze(&self, email: &InboundEmail) -> EmailInsights {
        let Some(primary) = &self.primary else {
            return self.heuristics.analyze(email);
        };

        match primary.analyze(email).await {
            Ok(insights) => insights,
            Err(e) if e.is_transient() => {
                warn!(provider = primary.name(), error = %e, "Provider call failed, retrying once");
                match primary.analyze(email).await {
                    Ok(insights) => insights,
                    Err(e) => {
                        warn!(provider = primary.name(), error = %e, "Retry failed, using heuristics");
                        self.heuristics.analyze(email)
                    }
                }
            }
            Err(e) => {
                warn!(provider = primary.name(), error = %e, "Provider rejected request, using heuristics");
                self.heuristics.analyze(email)
            }
        }
    }
}
