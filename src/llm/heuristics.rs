//! Deterministic keyword/pattern analysis, the provider-free fallback.

use regex::Regex;

use crate::llm::{EmailInsights, InsightSource};
use crate::message::InboundEmail;

/// Topic buckets matched against subject+body.
const TOPIC_PATTERNS: &[(&str, &str)] = &[
    ("billing", r"(?i)\b(invoice|billing|payment|refund|charge|subscription|plan)\b"),
    ("support", r"(?i)\b(help|issue|problem|error|bug|broken|not working)\b"),
    ("scheduling", r"(?i)\b(meeting|schedule|calendar|reschedule|appointment|call)\b"),
    ("account", r"(?i)\b(password|login|account|access|permission)\b"),
    ("sales", r"(?i)\b(pricing|quote|demo|trial|purchase|upgrade)\b"),
];

/// Keyword analyzer used when no provider is configured or reachable.
pub struct HeuristicAnalyzer {
    urgency: Regex,
    action_line: Regex,
    topics: Vec<(&'static str, Regex)>,
}

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self {
            urgency: Regex::new(
                r"(?i)\b(urgent|asap|immediately|critical|emergency|deadline|outage|down|escalat)",
            )
            .unwrap(),
            // Lines that read like a request: imperative openers or question marks.
            action_line: Regex::new(
                r"(?i)^\s*(please|can you|could you|need(s)? to|must|should|action required)\b",
            )
            .unwrap(),
            topics: TOPIC_PATTERNS
                .iter()
                .map(|(label, pattern)| (*label, Regex::new(pattern).unwrap()))
                .collect(),
        }
    }

    /// Analyze one email. Deterministic, cannot fail.
    pub fn analyze(&self, email: &InboundEmail) -> EmailInsights {
        let haystack = format!("{}\n{}", email.subject, email.body);

        let topics: Vec<String> = self
            .topics
            .iter()
            .filter(|(_, re)| re.is_match(&haystack))
            .map(|(label, _)| label.to_string())
            .collect();

        let action_items: Vec<String> = email
            .body
            .lines()
            .filter(|line| self.action_line.is_match(line) || line.trim_end().ends_with('?'))
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .take(5)
            .collect();

        let urgent = self.urgency.is_match(&haystack);

        let summary = if email.subject.trim().is_empty() {
            let first_line = email.body.lines().find(|l| !l.trim().is_empty());
            first_line.unwrap_or("(empty message)").trim().to_string()
        } else {
            email.subject.trim().to_string()
        };

        EmailInsights {
            summary,
            topics,
            action_items,
            urgent,
            source: InsightSource::Heuristic,
        }
    }
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(subject: &str, body: &str) -> InboundEmail {
        InboundEmail::new("<m@x>", "a@b.c", subject, body, vec![], vec![], vec![])
    }

    #[test]
    fn detects_topics_and_urgency() {
        let analyzer = HeuristicAnalyzer::new();
        let insights = analyzer.analyze(&email(
            "URGENT: billing error",
            "My invoice is wrong and payment failed. Please fix this ASAP.",
        ));
        assert!(insights.urgent);
        assert!(insights.topics.contains(&"billing".to_string()));
        assert!(insights.topics.contains(&"support".to_string()));
    }

    #[test]
    fn extracts_action_items() {
        let analyzer = HeuristicAnalyzer::new();
        let insights = analyzer.analyze(&email(
            "Requests",
            "Please send the updated contract.\nAlso, can you confirm the meeting time?\nThanks!",
        ));
        assert_eq!(insights.action_items.len(), 2);
        assert!(insights.action_items[0].starts_with("Please send"));
    }

    #[test]
    fn summary_falls_back_to_first_body_line() {
        let analyzer = HeuristicAnalyzer::new();
        let insights = analyzer.analyze(&email("", "\nHello there.\nMore text."));
        assert_eq!(insights.summary, "Hello there.");
    }

    #[test]
    fn plain_message_is_not_urgent() {
        let analyzer = HeuristicAnalyzer::new();
        let insights = analyzer.analyze(&email("Lunch?", "Want to grab lunch on Friday?"));
        assert!(!insights.urgent);
        assert_eq!(insights.source, InsightSource::Heuristic);
    }
}
