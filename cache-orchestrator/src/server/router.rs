use super::handlers::{self, AppState};
use super::metrics_handler::metrics_handler;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the Axum router with all endpoints
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Observability
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_snapshot))
        .route("/metrics/prometheus", get(metrics_handler))
        .route("/strategies", get(handlers::strategy_report))
        // Control
        .route("/warmup", post(handlers::warmup))
        .route("/warmup/jobs", get(handlers::warmup_jobs))
        .route("/invalidate", post(handlers::invalidate))
        .route("/cleanup", post(handlers::cleanup))
        .route("/prefetch/{user_id}", post(handlers::prefetch))
        // Alerts
        .route("/alerts", get(handlers::active_alerts))
        .route("/alerts/{id}/resolve", post(handlers::resolve_alert))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
