//! Integration tests for the agent API endpoints

#[allow(dead_code)]
#[path = "../src/api.rs"]
mod api;

use agent_lib::{
    health::{components, HealthRegistry},
    models::{ActionCode, ClusterState, Sample},
    observability::{collaborators, AgentMetrics},
    CollaboratorError,
};
use api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    for component in components::ALL {
        health_registry.register(component).await;
    }

    let metrics = AgentMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_ok_after_single_failure() {
    let (app, state) = setup_test_app().await;

    // One failed fetch only degrades the provider
    state
        .health_registry
        .record_outcome(
            components::METRICS_PROVIDER,
            1,
            Some("connection refused".into()),
        )
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["metrics_provider"]["message"],
        "connection refused"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_after_repeated_failures() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .record_outcome(components::POWER_METER, 5, Some("snmpget timed out".into()))
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(health["components"]["power_meter"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_before_loop_starts() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["reason"], "Control loop not yet started");
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::ACTION_EXECUTOR, "ipmitool not found")
        .await;

    let (status, _body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_control_metrics() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_cycle_duration(0.02);
    state.metrics.set_sample(&Sample {
        state: ClusterState::OnlyB,
        cpu_worker_avg: 81.5,
        gpu_worker_avg: 12.0,
        gpu_pending: false,
    });
    state.metrics.set_power_watts(1450.0);
    state.metrics.inc_actions_dispatched(ActionCode::PowerOnA);
    state.metrics.inc_collaborator_error(
        collaborators::METRICS_PROVIDER,
        &CollaboratorError::Transport("connection refused".into()),
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("power_agent_cycle_duration_seconds_bucket"));
    assert!(metrics_text.contains("power_agent_cluster_state 1"));
    assert!(metrics_text.contains("power_agent_power_watts 1450"));
    assert!(metrics_text.contains(r#"power_agent_actions_dispatched_total{action="power_on_a"}"#));
    assert!(metrics_text.contains(
        r#"power_agent_collaborator_errors_total{collaborator="metrics_provider",kind="transient"}"#
    ));
}

#[tokio::test]
async fn test_healthz_includes_every_collaborator() {
    let (app, _state) = setup_test_app().await;

    let (_status, body) = get(app, "/healthz").await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    for component in components::ALL {
        assert!(health["components"][component].is_object(), "{component}");
    }
}
