use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use inbox_agents::admin::{AdminState, admin_routes};
use inbox_agents::agents::{FaqAgent, ReportAgent};
use inbox_agents::config::ServiceConfig;
use inbox_agents::dispatch::{AgentHandler, CommandDispatcher};
use inbox_agents::ingest::{IngestOutcome, IngestService};
use inbox_agents::llm::{FallbackProvider, InsightProvider, OpenAiInsightProvider};
use inbox_agents::message::InboundEmail;
use inbox_agents::queue::{AnalysisQueue, AnalysisWorker, WorkerConfig};
use inbox_agents::report::{InsightReportBuilder, ReportCache, ReportService};
use inbox_agents::routing::RecipientResolver;
use inbox_agents::security::ConfigRegistry;
use inbox_agents::security::builtin::default_engine;
use inbox_agents::store::{LibSqlStore, Store};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export INBOX_AGENTS_DOMAIN=agents.example.com");
        std::process::exit(1);
    });

    eprintln!("📬 Inbox Agents v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Domain: {}", config.domain);
    eprintln!("   Agents: {}", config.agent_types.join(", "));
    eprintln!("   Ingest API: http://0.0.0.0:{}/api/ingest", config.admin_port);
    eprintln!("   Admin API: http://0.0.0.0:{}/api/status", config.admin_port);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(
        LibSqlStore::new_local(std::path::Path::new(&config.db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}\n", config.db_path);

    // ── Security ────────────────────────────────────────────────────────
    let stored_configs = store.load_security_configs().await.unwrap_or_default();
    let registry = Arc::new(ConfigRegistry::with_configs(stored_configs).unwrap_or_else(|e| {
        eprintln!("Error: Invalid stored security config: {e}");
        std::process::exit(1);
    }));
    let engine = Arc::new(default_engine());

    // ── Analysis pipeline ───────────────────────────────────────────────
    let queue = Arc::new(AnalysisQueue::new());
    let primary = config
        .provider_api_key
        .clone()
        .map(|key| {
            Box::new(OpenAiInsightProvider::new(key, config.provider_model.clone()))
                as Box<dyn InsightProvider>
        });
    if primary.is_none() {
        eprintln!("   OPENAI_API_KEY not set, analysis uses heuristics only\n");
    }
    let provider = Arc::new(FallbackProvider::new(primary));
    AnalysisWorker::new(
        Arc::clone(&queue),
        provider,
        Arc::clone(&store),
        WorkerConfig {
            poll_interval: config.worker_poll_interval,
            batch_size: config.worker_batch_size,
        },
    )
    .spawn();

    // ── Reports ─────────────────────────────────────────────────────────
    let cache = ReportCache::new(config.report_ttl);
    let reports = Arc::new(ReportService::new(
        cache.clone(),
        Arc::new(InsightReportBuilder::new(Arc::clone(&store))),
        config.report_wait_timeout,
    ));

    // ── Agents ──────────────────────────────────────────────────────────
    let mut dispatchers = Vec::new();
    for agent_type in &config.agent_types {
        let handler: Arc<dyn AgentHandler> = match agent_type.as_str() {
            "faq" => Arc::new(FaqAgent::new()),
            "report" => Arc::new(ReportAgent::new(Arc::clone(&reports))),
            other => {
                eprintln!("   Warning: no handler for agent type '{other}', skipping");
                continue;
            }
        };
        dispatchers.push(CommandDispatcher::new(
            handler,
            Arc::clone(&engine),
            Arc::clone(&registry),
        ));
    }

    let ingest = Arc::new(IngestService::new(
        RecipientResolver::new(config.domain.clone(), config.agent_types.clone()),
        dispatchers,
        Arc::clone(&queue),
        Arc::clone(&store),
        config.dispatch_timeout,
    ));

    // ── HTTP surface ────────────────────────────────────────────────────
    let app = admin_routes(AdminState {
        configs: registry,
        store,
        cache,
        queue,
    })
    .merge(
        Router::new()
            .route("/api/ingest", post(ingest_email))
            .with_state(ingest),
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.admin_port))
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: Failed to bind port {}: {}", config.admin_port, e);
            std::process::exit(1);
        });
    axum::serve(listener, app).await.ok();
}

/// Wire form of one inbound message, as handed over by a mail front end.
#[derive(Debug, Deserialize)]
struct IngestRequest {
    external_id: String,
    sender: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    cc: Vec<String>,
    #[serde(default)]
    bcc: Vec<String>,
    #[serde(default)]
    in_reply_to: Option<String>,
}

async fn ingest_email(
    State(ingest): State<Arc<IngestService>>,
    Json(req): Json<IngestRequest>,
) -> Json<serde_json::Value> {
    let mut email = InboundEmail::new(
        req.external_id,
        req.sender,
        req.subject,
        req.body,
        req.to,
        req.cc,
        req.bcc,
    );
    email.in_reply_to = req.in_reply_to;
    let body = match ingest.ingest(&email).await {
        IngestOutcome::Accepted {
            agent,
            reply,
            priority,
        } => json!({
            "outcome": "accepted",
            "agent": agent,
            "priority": priority,
            "reply": reply.body,
        }),
        IngestOutcome::Rejected { decision, notice } => json!({
            "outcome": "rejected",
            "reason": decision.reason,
            "notice": notice,
        }),
        IngestOutcome::Dropped { reason, notice } => json!({
            "outcome": "dropped",
            "reason": reason,
            "notice": notice,
        }),
        IngestOutcome::Failed { reason } => json!({
            "outcome": "failed",
            "reason": reason,
        }),
    };
    Json(body)
}
