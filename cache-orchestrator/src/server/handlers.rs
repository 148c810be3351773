use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::OrchestratorError;
use crate::orchestrator::CacheOrchestrator;
use crate::orchestrator::health::HealthTier;
use crate::orchestrator::invalidation::InvalidationRequest;
use crate::orchestrator::prefetch::{LearningProfile, SessionSummary};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: CacheOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: CacheOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WarmupRequest {
    pub patterns: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PrefetchRequest {
    pub learning_profile: LearningProfile,
    pub recent_sessions: Vec<SessionSummary>,
}

/// GET /health - classified health; critical maps to 503
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.orchestrator.get_health_status().await;
    let code = match status.overall {
        HealthTier::Healthy | HealthTier::Warning => StatusCode::OK,
        HealthTier::Critical => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(status))
}

/// GET /metrics
pub async fn metrics_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.get_metrics().await)
}

/// GET /strategies
pub async fn strategy_report(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.get_strategy_report())
}

/// GET /warmup/jobs
pub async fn warmup_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.warmup_jobs())
}

/// POST /warmup
pub async fn warmup(
    State(state): State<AppState>,
    Json(req): Json<WarmupRequest>,
) -> impl IntoResponse {
    debug!("REST WARMUP patterns={:?}", req.patterns);
    Json(state.orchestrator.warmup_cache(req.patterns).await)
}

/// POST /invalidate - 500 with the partial count when a selector fails
pub async fn invalidate(
    State(state): State<AppState>,
    Json(req): Json<InvalidationRequest>,
) -> impl IntoResponse {
    debug!("REST INVALIDATE {:?}", req);
    let result = state.orchestrator.invalidate_cache(&req).await;
    let code = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(result))
}

/// POST /cleanup
pub async fn cleanup(State(state): State<AppState>) -> impl IntoResponse {
    debug!("REST CLEANUP");
    Json(state.orchestrator.cleanup_cache().await)
}

/// GET /alerts - unresolved alerts
pub async fn active_alerts(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.active_alerts())
}

/// POST /alerts/{id}/resolve
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, OrchestratorError> {
    state.orchestrator.resolve_alert(&id)?;
    info!("REST RESOLVE ALERT {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /prefetch/{user_id}
pub async fn prefetch(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<PrefetchRequest>,
) -> impl IntoResponse {
    debug!(
        "REST PREFETCH user={} sessions={}",
        user_id,
        req.recent_sessions.len()
    );
    Json(
        state
            .orchestrator
            .prefetch_for_user(&user_id, &req.learning_profile, &req.recent_sessions)
            .await,
    )
}
