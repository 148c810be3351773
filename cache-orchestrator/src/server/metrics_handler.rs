//! Prometheus Metrics HTTP Handler

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::handlers::AppState;

/// GET /metrics/prometheus - Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    // Refresh gauges from a live snapshot
    state.orchestrator.collect_metrics().await;

    match crate::metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}
