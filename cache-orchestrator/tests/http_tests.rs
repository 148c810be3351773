// HTTP Admin API Tests
// Real HTTP requests against the router on an ephemeral port

use cache_orchestrator::orchestrator::alerts::{AlertCheck, AlertSeverity};
use cache_orchestrator::{
    AppState, BackingStore, CacheOrchestrator, CacheTiers, MemoryBackingStore,
    OrchestratorConfig, ValueCodec, create_router, init_metrics,
};
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

struct TestServer {
    url: String,
    orchestrator: CacheOrchestrator,
    backing: Arc<MemoryBackingStore>,
}

fn framed(value: &[u8]) -> Vec<u8> {
    ValueCodec::new(Default::default()).encode(value, 0).unwrap()
}

async fn spawn_test_server() -> TestServer {
    let mut config = OrchestratorConfig::default();
    config.monitoring.enabled = false;

    let backing = Arc::new(MemoryBackingStore::new());
    let tiers = CacheTiers::with_backing(&config, backing.clone());

    let orchestrator = CacheOrchestrator::new(config, tiers);
    orchestrator.initialize().await.unwrap();
    init_metrics();

    let app = create_router(AppState::new(orchestrator.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    TestServer {
        url,
        orchestrator,
        backing,
    }
}

// ==================== OBSERVABILITY ====================

#[tokio::test]
async fn test_health_returns_200_when_healthy() {
    let server = spawn_test_server().await;
    let client = Client::new();

    let res = client
        .get(format!("{}/health", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["overall"], "healthy");
    assert_eq!(body["backing_store"]["connected"], true);
}

#[tokio::test]
async fn test_health_returns_503_when_critical() {
    let server = spawn_test_server().await;
    server.backing.set_reachable(false);
    let client = Client::new();

    let res = client
        .get(format!("{}/health", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["overall"], "critical");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_metrics_snapshot() {
    let server = spawn_test_server().await;
    let client = Client::new();

    let res = client
        .get(format!("{}/metrics", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert!(body["recent_operations"].is_array());
    assert!(body["active_alerts"].is_array());
    assert_eq!(body["warmup_jobs"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_prometheus_exposition() {
    let server = spawn_test_server().await;
    let client = Client::new();

    // Generate at least one sample
    client
        .post(format!("{}/cleanup", server.url))
        .send()
        .await
        .unwrap();

    let res = client
        .get(format!("{}/metrics/prometheus", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let text = res.text().await.unwrap();
    assert!(text.contains("cache_orchestrator_cleanup_runs_total"));
}

#[tokio::test]
async fn test_strategy_report() {
    let server = spawn_test_server().await;
    let client = Client::new();

    let res = client
        .get(format!("{}/strategies", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    let report = body.as_object().unwrap();
    assert_eq!(report.len(), 4);
    assert_eq!(report["user_sessions"]["namespace"], "session");
}

// ==================== CONTROL ====================

#[tokio::test]
async fn test_warmup_endpoint() {
    let server = spawn_test_server().await;
    server
        .backing
        .set("content:popular:1", framed(b"x"), None)
        .await
        .unwrap();
    let client = Client::new();

    let res = client
        .post(format!("{}/warmup", server.url))
        .json(&json!({ "patterns": ["content:popular:*"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["keys_warmed"], 1);

    // Defaults when no patterns are given
    let res = client
        .post(format!("{}/warmup", server.url))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalidate_endpoint() {
    let server = spawn_test_server().await;
    server
        .backing
        .set("users:42", b"x".to_vec(), None)
        .await
        .unwrap();
    let client = Client::new();

    let res = client
        .post(format!("{}/invalidate", server.url))
        .json(&json!({ "pattern": "users:*" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["keys_invalidated"], 1);
    assert!(server.backing.get("users:42").await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalidate_unknown_strategy_returns_500_with_partial_count() {
    let server = spawn_test_server().await;
    server
        .backing
        .set("users:1", b"x".to_vec(), None)
        .await
        .unwrap();
    let client = Client::new();

    let res = client
        .post(format!("{}/invalidate", server.url))
        .json(&json!({ "pattern": "users:*", "strategy": "missing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["keys_invalidated"], 1);
}

#[tokio::test]
async fn test_cleanup_endpoint() {
    let server = spawn_test_server().await;
    let client = Client::new();

    let res = client
        .post(format!("{}/cleanup", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["items_removed"].is_u64());
    assert!(body["space_freed"].is_u64());
}

#[tokio::test]
async fn test_prefetch_endpoint() {
    let server = spawn_test_server().await;
    server
        .backing
        .set("content:related:42:1", framed(b"x"), None)
        .await
        .unwrap();
    let client = Client::new();

    let res = client
        .post(format!("{}/prefetch/u1", server.url))
        .json(&json!({
            "learning_profile": { "reading": 0.7 },
            "recent_sessions": [
                { "session_id": "s1", "content_ids": ["42"], "started_at": Utc::now() }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["items_prefetched"], 1);
}

// ==================== ALERTS ====================

#[tokio::test]
async fn test_resolve_alert() {
    let server = spawn_test_server().await;
    let alert = server.orchestrator.alerts().raise(
        AlertCheck::MemoryUsage,
        AlertSeverity::Warning,
        90.0,
        85.0,
        Utc::now(),
    );
    let client = Client::new();

    let res = client
        .get(format!("{}/alerts", server.url))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["type"], "warning");

    let res = client
        .post(format!("{}/alerts/{}/resolve", server.url, alert.id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(server.orchestrator.active_alerts().is_empty());
}

#[tokio::test]
async fn test_resolve_unknown_alert_returns_404() {
    let server = spawn_test_server().await;
    let client = Client::new();

    let res = client
        .post(format!("{}/alerts/nope/resolve", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], 404);
}
