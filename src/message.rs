//! Normalized inbound message types.
//!
//! A mail-ingestion collaborator hands the core an `InboundEmail` that is
//! already parsed out of its transport format. The core never touches raw
//! RFC 5322 — everything downstream works on this struct, which is
//! immutable once ingested.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized inbound email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    /// Unique ID (generated at ingestion).
    pub id: Uuid,
    /// Channel-native message id (e.g. the Message-ID header value).
    pub external_id: String,
    /// Sender address, lowercased.
    pub sender: String,
    /// Human-readable sender name, if the ingestion layer had one.
    pub sender_name: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// To recipients, lowercased.
    pub to: Vec<String>,
    /// Cc recipients, lowercased.
    pub cc: Vec<String>,
    /// Bcc recipients, lowercased (usually only the agent's own address).
    pub bcc: Vec<String>,
    /// Thread linkage: id of the message this one replies to.
    pub in_reply_to: Option<String>,
    /// When the message was received by the ingestion layer.
    pub received_at: DateTime<Utc>,
}

impl InboundEmail {
    /// Build a normalized message, lowercasing every address.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        external_id: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        to: Vec<String>,
        cc: Vec<String>,
        bcc: Vec<String>,
    ) -> Self {
        let lower = |v: Vec<String>| -> Vec<String> {
            v.into_iter().map(|a| a.trim().to_lowercase()).collect()
        };
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            sender: sender.into().trim().to_lowercase(),
            sender_name: None,
            subject: subject.into(),
            body: body.into(),
            to: lower(to),
            cc: lower(cc),
            bcc: lower(bcc),
            in_reply_to: None,
            received_at: Utc::now(),
        }
    }

    /// All recipients across To/Cc/Bcc, in that order.
    pub fn all_recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(String::as_str)
    }

    /// Domain part of the sender address, if present.
    pub fn sender_domain(&self) -> Option<&str> {
        self.sender.rsplit_once('@').map(|(_, d)| d)
    }

    /// Whether this message continues an existing thread.
    pub fn is_followup(&self) -> bool {
        self.in_reply_to.is_some()
    }
}
