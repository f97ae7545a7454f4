//! Priority batching queue between ingestion and analysis.
//!
//! Ingestion enqueues and acknowledges in milliseconds; the worker in
//! [`worker`] drains batches on its own schedule. Strict priority order,
//! FIFO within a tier.

pub mod worker;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use crate::message::InboundEmail;

pub use worker::{AnalysisWorker, WorkerConfig};

/// Analysis priority tier, derived from content signals at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Classifies emails into priority tiers by subject/body signals.
pub struct PriorityClassifier {
    urgent: Regex,
    informational: Regex,
}

impl PriorityClassifier {
    pub fn new() -> Self {
        Self {
            // Urgency keywords anywhere in subject or body.
            urgent: Regex::new(
                r"(?i)\b(urgent|asap|immediately|critical|emergency|deadline|outage|down|blocked|escalat)",
            )
            .unwrap(),
            // Informational subjects: newsletters, digests, FYI traffic.
            informational: Regex::new(
                r"(?i)\b(fyi|newsletter|digest|weekly update|monthly report|announcement|no action (required|needed))\b",
            )
            .unwrap(),
        }
    }

    /// Derive a tier for one email. Urgency wins over informational.
    pub fn classify(&self, email: &InboundEmail) -> Priority {
        let haystack = format!("{}\n{}", email.subject, email.body);
        if self.urgent.is_match(&haystack) {
            Priority::High
        } else if self.informational.is_match(&email.subject) {
            Priority::Low
        } else {
            Priority::Medium
        }
    }
}

impl Default for PriorityClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// One queued analysis item.
#[derive(Debug, Clone)]
pub struct QueuedEmail {
    pub id: Uuid,
    pub email: InboundEmail,
    pub organization_id: String,
    pub priority: Priority,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    /// Monotonic enqueue sequence, breaks ties FIFO within a tier.
    seq: u64,
}

impl PartialEq for QueuedEmail {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedEmail {}

impl PartialOrd for QueuedEmail {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEmail {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower seq (earlier) first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// In-process priority queue feeding the analysis worker.
pub struct AnalysisQueue {
    heap: Mutex<BinaryHeap<QueuedEmail>>,
    next_seq: AtomicU64,
    classifier: PriorityClassifier,
}

impl AnalysisQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
            classifier: PriorityClassifier::new(),
        }
    }

    /// Enqueue an email for deferred analysis. Cheap and non-blocking.
    pub fn queue_email(&self, email: InboundEmail, organization_id: &str) -> Priority {
        let priority = self.classifier.classify(&email);
        let item = QueuedEmail {
            id: Uuid::new_v4(),
            email,
            organization_id: organization_id.to_string(),
            priority,
            enqueued_at: chrono::Utc::now(),
            seq: self.next_seq.fetch_add(1, AtomicOrdering::Relaxed),
        };
        debug!(
            item_id = %item.id,
            organization = %item.organization_id,
            priority = priority.as_str(),
            "Queued email for analysis"
        );
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        heap.push(item);
        priority
    }

    /// Pop up to `max` items in strict priority order, FIFO within a tier.
    pub fn drain_batch(&self, max: usize) -> Vec<QueuedEmail> {
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        let mut batch = Vec::with_capacity(max.min(heap.len()));
        while batch.len() < max {
            match heap.pop() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AnalysisQueue {
    fn default() -> Self {
        Self::new()
    }
}
