//! Visibility classification — how a message was disclosed to an agent.
//!
//! Policies care whether the agent was addressed directly (To), copied
//! for awareness (Cc), or blind-copied (Bcc). The context is derived once
//! per (message, agent address) pair and is read-only from then on.

use serde::{Deserialize, Serialize};

use crate::message::InboundEmail;

/// Read-only disclosure semantics for one (message, agent address) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityContext {
    /// Agent address appears in To.
    pub is_to: bool,
    /// Agent address appears in Cc.
    pub is_cc: bool,
    /// Agent address appears in Bcc.
    pub is_bcc: bool,
    /// All recipients of the message (To + Cc + Bcc).
    pub recipients: Vec<String>,
    /// Sender address.
    pub sender: String,
}

impl VisibilityContext {
    /// Classify how `agent_address` received this message.
    pub fn classify(email: &InboundEmail, agent_address: &str) -> Self {
        let addr = agent_address.to_lowercase();
        Self {
            is_to: email.to.iter().any(|r| r == &addr),
            is_cc: email.cc.iter().any(|r| r == &addr),
            is_bcc: email.bcc.iter().any(|r| r == &addr),
            recipients: email.all_recipients().map(String::from).collect(),
            sender: email.sender.clone(),
        }
    }

    /// Cc recipients other than the agent itself — used as weak
    /// organizational signals by hierarchy enrichment.
    pub fn peer_cc<'a>(&'a self, email: &'a InboundEmail, agent_address: &str) -> Vec<&'a str> {
        let addr = agent_address.to_lowercase();
        email
            .cc
            .iter()
            .filter(|r| **r != addr)
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> InboundEmail {
        InboundEmail::new(
            "<v@mail>",
            "alice@corp.io",
            "subject",
            "body",
            vec!["faq+acme@agents.example.com".into(), "bob@corp.io".into()],
            vec!["carol@corp.io".into()],
            vec![],
        )
    }

    #[test]
    fn classifies_to() {
        let ctx = VisibilityContext::classify(&email(), "faq+acme@agents.example.com");
        assert!(ctx.is_to);
        assert!(!ctx.is_cc);
        assert!(!ctx.is_bcc);
        assert_eq!(ctx.sender, "alice@corp.io");
        assert_eq!(ctx.recipients.len(), 3);
    }

    #[test]
    fn classifies_cc() {
        let mut e = email();
        e.to = vec!["bob@corp.io".into()];
        e.cc = vec!["faq+acme@agents.example.com".into()];
        let ctx = VisibilityContext::classify(&e, "faq+acme@agents.example.com");
        assert!(!ctx.is_to);
        assert!(ctx.is_cc);
    }

    #[test]
    fn classifies_bcc() {
        let mut e = email();
        e.to = vec!["bob@corp.io".into()];
        e.bcc = vec!["faq+acme@agents.example.com".into()];
        let ctx = VisibilityContext::classify(&e, "faq+acme@agents.example.com");
        assert!(ctx.is_bcc);
    }

    #[test]
    fn classification_is_case_insensitive() {
        let ctx = VisibilityContext::classify(&email(), "FAQ+ACME@agents.example.com");
        assert!(ctx.is_to);
    }

    #[test]
    fn peer_cc_excludes_agent() {
        let mut e = email();
        e.cc = vec![
            "faq+acme@agents.example.com".into(),
            "carol@corp.io".into(),
        ];
        let ctx = VisibilityContext::classify(&e, "faq+acme@agents.example.com");
        let peers = ctx.peer_cc(&e, "faq+acme@agents.example.com");
        assert_eq!(peers, vec!["carol@corp.io"]);
    }
}
