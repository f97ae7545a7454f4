//! End-to-end flow: ingest -> dispatch -> queue -> analysis -> report.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use inbox_agents::agents::FaqAgent;
use inbox_agents::dispatch::CommandDispatcher;
use inbox_agents::ingest::{IngestOutcome, IngestService};
use inbox_agents::llm::FallbackProvider;
use inbox_agents::message::InboundEmail;
use inbox_agents::queue::{AnalysisQueue, AnalysisWorker, Priority, WorkerConfig};
use inbox_agents::report::{InsightReportBuilder, ReportCache, ReportKey, ReportKind, ReportService};
use inbox_agents::routing::RecipientResolver;
use inbox_agents::security::builtin::default_engine;
use inbox_agents::security::ConfigRegistry;
use inbox_agents::store::{MemoryStore, Store, SubmissionOutcome};

const DOMAIN: &str = "agents.example.com";

struct Harness {
    ingest: IngestService,
    queue: Arc<AnalysisQueue>,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(AnalysisQueue::new());
    let engine = Arc::new(default_engine());
    let registry = Arc::new(ConfigRegistry::new());
    let dispatcher = CommandDispatcher::new(Arc::new(FaqAgent::new()), engine, registry);
    let ingest = IngestService::new(
        RecipientResolver::new(DOMAIN, vec!["faq".into(), "report".into()]),
        vec![dispatcher],
        Arc::clone(&queue),
        store.clone() as Arc<dyn Store>,
        Duration::from_secs(5),
    );
    Harness {
        ingest,
        queue,
        store,
    }
}

fn email_to_faq(external_id: &str, sender: &str, subject: &str, body: &str) -> InboundEmail {
    InboundEmail::new(
        external_id,
        sender,
        subject,
        body,
        vec![format!("faq+acme@{DOMAIN}")],
        vec!["bob@corp.io".to_string()],
        vec![],
    )
}

#[tokio::test]
async fn accepted_email_flows_through_to_a_report() {
    let h = harness();

    let email = email_to_faq(
        "<m1@mail>",
        "alice@corp.io",
        "URGENT: billing outage",
        "Our invoices page is down.\n#dept: finance\nPlease escalate.",
    );
    let outcome = h.ingest.ingest(&email).await;
    let IngestOutcome::Accepted {
        agent,
        reply,
        priority,
    } = outcome
    else {
        panic!("expected accepted outcome");
    };
    assert_eq!(agent, "faq+acme");
    assert_eq!(priority, Priority::High);
    assert!(reply.body.is_some());

    // Submission recorded, queue holds the message for deferred analysis.
    let subs = h.store.recent_submissions("faq+acme", 10).await.unwrap();
    assert_eq!(subs.len(), 1);
    assert!(matches!(subs[0].outcome, SubmissionOutcome::Completed));
    assert_eq!(subs[0].organization_id.as_deref(), Some("acme"));
    assert_eq!(h.queue.len(), 1);

    // Hierarchy hints from the body tag and the Cc chain were merged.
    let record = h.store.get_hierarchy("acme").await.unwrap().unwrap();
    assert!(record.departments.contains_key("finance"));
    assert!(
        record
            .relationships
            .iter()
            .any(|r| r.employee == "alice@corp.io" && r.manager == "bob@corp.io")
    );

    // The worker analyzes the batch with heuristics (no provider configured).
    let worker = AnalysisWorker::new(
        Arc::clone(&h.queue),
        Arc::new(FallbackProvider::new(None)),
        h.store.clone() as Arc<dyn Store>,
        WorkerConfig::default(),
    );
    let (analyzed, failed) = worker.process_batch().await;
    assert_eq!((analyzed, failed), (1, 0));
    assert!(h.queue.is_empty());

    let cutoff = Utc::now() - ChronoDuration::hours(1);
    let insights = h.store.insights_since("acme", cutoff).await.unwrap();
    assert_eq!(insights.len(), 1);
    assert!(insights[0].insights.urgent);

    // The report builder aggregates the stored insights.
    let reports = ReportService::new(
        ReportCache::new(Duration::from_secs(300)),
        Arc::new(InsightReportBuilder::new(h.store.clone() as Arc<dyn Store>)),
        Duration::from_secs(2),
    );
    let key = ReportKey::new("report+acme", "2026-W35", ReportKind::Summary);
    let fetched = reports.get_report(&key).await.unwrap();
    assert!(!fetched.is_stale);
    assert_eq!(fetched.report.total_messages, 1);
    assert_eq!(fetched.report.urgent_messages, 1);
}

#[tokio::test]
async fn unroutable_and_idempotent_hierarchy() {
    let h = harness();

    // Typo in the agent type gets a corrective notice.
    let typo = InboundEmail::new(
        "<m2@mail>",
        "alice@corp.io",
        "hi",
        "",
        vec![format!("fqa+acme@{DOMAIN}")],
        vec![],
        vec![],
    );
    let IngestOutcome::Dropped { notice, .. } = h.ingest.ingest(&typo).await else {
        panic!("expected dropped outcome");
    };
    assert!(notice.is_some());

    // Re-ingesting the same hints does not duplicate hierarchy rows.
    for n in 0..2 {
        let email = email_to_faq(
            &format!("<m3-{n}@mail>"),
            "alice@corp.io",
            "question",
            "#dept: finance",
        );
        assert!(matches!(
            h.ingest.ingest(&email).await,
            IngestOutcome::Accepted { .. }
        ));
    }
    let record = h.store.get_hierarchy("acme").await.unwrap().unwrap();
    assert_eq!(record.departments["finance"].members.len(), 1);
    assert_eq!(record.relationships.len(), 1);
}
