//! Content scanning against abuse signatures.
//!
//! Matches are counted, never echoed: logging or returning the matched
//! text would leak exactly the content the scan exists to contain. A hit
//! blocks and quarantines the message for review.

use regex::Regex;
use tracing::debug;

use crate::error::PolicyError;
use crate::message::InboundEmail;
use crate::routing::VisibilityContext;
use crate::security::config::AgentSecurityConfig;
use crate::security::policy::{SecurityPolicy, ValidationResult};

/// A compiled abuse signature.
struct Signature {
    /// Short label for metadata (never the pattern itself).
    label: &'static str,
    regex: Regex,
}

/// Pattern scan over subject + body.
pub struct ContentScanPolicy {
    signatures: Vec<Signature>,
}

impl ContentScanPolicy {
    /// The stock signature set: injection attempts, credential phishing,
    /// mass-mail footprints, executable attachments smuggled as links.
    pub fn default_signatures() -> Self {
        let sig = |label: &'static str, pattern: &str| Signature {
            label,
            regex: Regex::new(pattern).expect("builtin signature must compile"),
        };
        Self {
            signatures: vec![
                sig(
                    "prompt_injection",
                    r"(?i)(ignore (all )?(prior|previous) instructions|disregard your (rules|system prompt))",
                ),
                sig(
                    "credential_phish",
                    r"(?i)(verify your (account|password)|confirm your credentials|suspended.{0,40}click)",
                ),
                sig(
                    "bulk_footprint",
                    r"(?i)(click here to unsubscribe|this is a mass mailing|bulk email)",
                ),
                sig(
                    "executable_link",
                    r"(?i)https?://\S+\.(exe|scr|bat|cmd|vbs)\b",
                ),
            ],
        }
    }

    /// Build from custom patterns (admin-supplied signature packs).
    pub fn from_patterns(patterns: &[(&'static str, &str)]) -> Result<Self, regex::Error> {
        let mut signatures = Vec::with_capacity(patterns.len());
        for (label, pattern) in patterns {
            signatures.push(Signature {
                label,
                regex: Regex::new(pattern)?,
            });
        }
        Ok(Self { signatures })
    }

    /// Count signature hits over subject + body. Returns (total, labels).
    fn scan(&self, email: &InboundEmail) -> (usize, Vec<&'static str>) {
        let haystack = format!("{}\n{}", email.subject, email.body);
        let mut total = 0;
        let mut labels = Vec::new();
        for sig in &self.signatures {
            let hits = sig.regex.find_iter(&haystack).count();
            if hits > 0 {
                total += hits;
                labels.push(sig.label);
            }
        }
        (total, labels)
    }
}

impl SecurityPolicy for ContentScanPolicy {
    fn name(&self) -> &'static str {
        "content_scan"
    }

    fn priority(&self) -> i32 {
        40
    }

    fn should_apply(
        &self,
        _email: &InboundEmail,
        _ctx: &VisibilityContext,
        _cfg: &AgentSecurityConfig,
    ) -> bool {
        !self.signatures.is_empty()
    }

    fn validate(
        &self,
        email: &InboundEmail,
        _ctx: &VisibilityContext,
        _cfg: &AgentSecurityConfig,
    ) -> Result<ValidationResult, PolicyError> {
        let (match_count, labels) = self.scan(email);
        if match_count == 0 {
            return Ok(ValidationResult::allow());
        }

        // Counts and labels only — the matched text stays out of logs
        // and results.
        debug!(
            id = %email.id,
            match_count,
            signatures = ?labels,
            "Content scan hit"
        );
        Ok(
            ValidationResult::quarantined("message content matched abuse signatures")
                .with_metadata(serde_json::json!({
                    "match_count": match_count,
                    "signatures": labels,
                })),
        )
    }
}
