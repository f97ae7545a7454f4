//! Admin REST surface.
//!
//! Read/update per-agent security configs, force cache invalidation, and
//! inspect queue/cache status. Config writes go through the validated
//! registry first and are persisted best-effort afterwards.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::queue::AnalysisQueue;
use crate::report::{Report, ReportCache, ReportKey, ReportKind};
use crate::security::{AgentSecurityConfig, ConfigRegistry};
use crate::store::Store;

/// Shared state for the admin routes.
#[derive(Clone)]
pub struct AdminState {
    pub configs: Arc<ConfigRegistry>,
    pub store: Arc<dyn Store>,
    pub cache: ReportCache<Report>,
    pub queue: Arc<AnalysisQueue>,
}

/// Build the admin router.
pub fn admin_routes(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/agents", get(list_agents))
        .route("/api/agents/{agent}/security", get(get_security))
        .route("/api/agents/{agent}/security", put(put_security))
        .route("/api/cache/invalidate", post(invalidate_cache))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /api/status — queue depth and cache occupancy.
async fn status(State(state): State<AdminState>) -> impl IntoResponse {
    let cache = state.cache.stats();
    Json(serde_json::json!({
        "queue_depth": state.queue.len(),
        "cache_entries": cache.entries,
        "builds_in_progress": cache.builds_in_progress,
    }))
}

/// GET /api/agents — names of all configured agents.
async fn list_agents(State(state): State<AdminState>) -> impl IntoResponse {
    Json(state.configs.agents())
}

/// GET /api/agents/{agent}/security
async fn get_security(
    State(state): State<AdminState>,
    Path(agent): Path<String>,
) -> impl IntoResponse {
    match state.configs.get(&agent) {
        Some(config) => Json(config).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("no security config for agent '{agent}'")})),
        )
            .into_response(),
    }
}

/// PUT /api/agents/{agent}/security — validate, apply, persist.
async fn put_security(
    State(state): State<AdminState>,
    Path(agent): Path<String>,
    Json(mut config): Json<AgentSecurityConfig>,
) -> impl IntoResponse {
    // The path segment is authoritative for which agent is being updated.
    config.agent = agent;

    if let Err(e) = state.configs.upsert(config.clone()) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response();
    }

    // In-memory registry is the live source; a failed persist is logged
    // and retried on the next update, not surfaced as a request failure.
    if let Err(e) = state.store.upsert_security_config(&config).await {
        warn!(agent = %config.agent, error = %e, "Failed to persist security config");
    }

    info!(agent = %config.agent, "Security config updated via admin");
    (StatusCode::OK, Json(config)).into_response()
}

#[derive(Debug, Deserialize)]
struct InvalidateRequest {
    agent: String,
    /// When present together with `kind`, only that key is invalidated.
    period: Option<String>,
    kind: Option<String>,
}

/// POST /api/cache/invalidate — one key or everything for an agent.
async fn invalidate_cache(
    State(state): State<AdminState>,
    Json(req): Json<InvalidateRequest>,
) -> impl IntoResponse {
    let removed = match (&req.period, &req.kind) {
        (Some(period), Some(kind)) => {
            let kind: ReportKind = match kind.parse() {
                Ok(k) => k,
                Err(e) => {
                    return (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(serde_json::json!({"error": e})),
                    )
                        .into_response();
                }
            };
            let key = ReportKey::new(req.agent.clone(), period.clone(), kind);
            usize::from(state.cache.invalidate(&key))
        }
        _ => state.cache.invalidate_agent(&req.agent),
    };

    info!(agent = %req.agent, removed, "Cache invalidated via admin");
    Json(serde_json::json!({"removed": removed})).into_response()
}
