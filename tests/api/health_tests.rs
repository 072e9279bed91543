//! Health Check API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;

use crate::common::TestApp;

#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::spawn().await;

    let (status, body) = app.get_json("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::spawn().await;

    let (status, body) = app.get_json("/health/live").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn test_readiness_reports_storage_and_connections() {
    let app = TestApp::spawn().await;
    let _a = app.connect(1).await;
    let _a2 = app.connect(1).await;
    let _b = app.connect(2).await;

    let (status, body) = app.get_json("/health/ready").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["storage"]["backend"], "memory");
    assert_eq!(body["checks"]["websocket"]["active_connections"], 3);
    assert_eq!(body["checks"]["websocket"]["online_users"], 2);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let app = TestApp::spawn().await;
    let _a = app.connect(1).await;

    let response = app.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("convo_websocket_connections_active"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/v1/nope").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_readiness_fails_while_memory_store_is_unavailable() {
    let app = TestApp::spawn().await;
    app.store.set_unavailable(true);

    let (status, body) = app.get_json("/health/ready").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["storage"]["status"], "unhealthy");
    assert_eq!(body["checks"]["storage"]["backend"], "memory");

    app.store.set_unavailable(false);
    let (status, _) = app.get_json("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
}
