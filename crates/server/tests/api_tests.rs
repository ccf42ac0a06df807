//! Integration tests for the HTTP endpoints

use axum::{
    body::{Body, BodyDataStream},
    http::{header, Method, Request, StatusCode},
    Router,
};
use k8s_openapi::api::core::v1::Node;
use mirror_lib::{
    health::HealthRegistry, BroadcastConfig, Change, ClusterMirror, ResourceEvent,
    StructuredLogger,
};
use opsview_server::{create_router, AppState};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tower::ServiceExt;

fn setup_test_app() -> (Router, Arc<AppState>) {
    let config = BroadcastConfig {
        settle_delay: Duration::from_millis(5),
        cooldown: Duration::from_millis(20),
        queue_capacity: 10,
    };
    let logger = StructuredLogger::new("test");
    let mirror = ClusterMirror::new(&config, logger.clone());
    let state = Arc::new(AppState::new(
        mirror,
        HealthRegistry::new(),
        logger,
        PathBuf::from("target/no-such-assets"),
    ));

    (create_router(state.clone()), state)
}

fn node(name: &str, unschedulable: bool) -> Node {
    serde_json::from_value(json!({
        "metadata": { "name": name, "labels": { "node-role.kubernetes.io/control-plane": "" } },
        "spec": { "unschedulable": unschedulable },
        "status": {
            "conditions": [{ "type": "Ready", "status": "True" }],
            "capacity": { "cpu": "8", "memory": "32Gi", "pods": "110" },
            "nodeInfo": {
                "architecture": "amd64",
                "bootID": "",
                "containerRuntimeVersion": "containerd://1.7.2",
                "kernelVersion": "6.1.0",
                "kubeProxyVersion": "v1.28.3",
                "kubeletVersion": "v1.28.3",
                "machineID": "",
                "operatingSystem": "linux",
                "osImage": "Debian GNU/Linux 12",
                "systemUUID": ""
            }
        }
    }))
    .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn wait_for_delivery(state: &AppState) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while state.mirror.last_delivery().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("a delivery");
}

async fn read_until(body: &mut BodyDataStream, received: &mut String, needle: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !received.contains(needle) {
            let chunk = body.next().await.expect("open stream").unwrap();
            received.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    })
    .await
    .expect("event in time");
}

#[tokio::test]
async fn test_alive_is_unconditional() {
    let (app, _state) = setup_test_app();

    let response = app.oneshot(get("/api/alive")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_ready_returns_503_before_first_delivery() {
    let (app, _state) = setup_test_app();

    let response = app.oneshot(get("/api/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["reason"], "no update delivered yet");
}

#[tokio::test]
async fn test_ready_after_delivery() {
    let (app, state) = setup_test_app();

    state
        .mirror
        .apply(ResourceEvent::Node(Change::Applied(node("cp-1", false))));
    wait_for_delivery(&state).await;

    let response = app.oneshot(get("/api/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["ready"], true);
}

#[tokio::test]
async fn test_health_reports_broadcaster() {
    let (app, _state) = setup_test_app();

    let response = app.oneshot(get("/api/health")).await.unwrap();
    // Not ready yet is degraded, which still serves
    assert_eq!(response.status(), StatusCode::OK);

    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["broadcaster"]["status"], "degraded");
}

#[tokio::test]
async fn test_snapshot_wire_format() {
    let (app, state) = setup_test_app();
    state
        .mirror
        .apply(ResourceEvent::Node(Change::Applied(node("cp-1", true))));

    let response = app.oneshot(get("/api/snapshot")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );

    let snapshot = body_json(response).await;
    assert_eq!(snapshot["pods"], json!([]));
    let node = &snapshot["nodes"][0];
    assert_eq!(node["name"], "cp-1");
    assert_eq!(node["status"], "Cordoned");
    assert_eq!(node["roles"], json!(["control-plane"]));
    assert_eq!(node["capacity"]["memory"], "32Gi");
    assert_eq!(node["version"], "v1.28.3");
    assert!(node.get("metrics").is_none());
}

#[tokio::test]
async fn test_snapshot_compressed_when_accepted() {
    let (app, state) = setup_test_app();
    state
        .mirror
        .apply(ResourceEvent::Node(Change::Applied(node("cp-1", false))));

    let request = Request::builder()
        .uri("/api/snapshot")
        .header(header::ACCEPT_ENCODING, "br")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "br");

    let plain = app.oneshot(get("/api/snapshot")).await.unwrap();
    assert!(plain.headers().get(header::CONTENT_ENCODING).is_none());
}

#[tokio::test]
async fn test_stream_sends_initial_snapshot_then_numbered_updates() {
    let (app, state) = setup_test_app();

    let response = app.oneshot(get("/api/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(state.mirror.subscriber_count(), 1);

    let mut body = response.into_body().into_data_stream();
    let mut received = String::new();

    read_until(&mut body, &mut received, "\n\n").await;
    assert!(received.contains(r#"data: {"nodes":[],"pods":[]}"#));
    assert!(!received.contains("id:"));

    state
        .mirror
        .apply(ResourceEvent::Node(Change::Applied(node("cp-1", false))));
    read_until(&mut body, &mut received, "id: update-1").await;
    assert!(received.contains("cp-1"));

    drop(body);
    assert_eq!(state.mirror.subscriber_count(), 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, state) = setup_test_app();
    state
        .mirror
        .apply(ResourceEvent::Node(Change::Applied(node("cp-1", false))));

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("opsview_broadcast_requests_total"));
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _state) = setup_test_app();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/snapshot")
        .header(header::ORIGIN, "http://viewer.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn test_unknown_path_falls_back_to_assets() {
    let (app, _state) = setup_test_app();

    let response = app.oneshot(get("/no-such-asset.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
