use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use centermesh::channel::default_channels;
use centermesh::{ChannelRegistry, MemoryBroker, RpcClient, RpcSettings, Worker, WorkerConfig};
use centermesh_gateway::{create_router, GatewayState, RouteTable};
use centermesh_workers::ServiceKind;

/// Every worker plus the gateway, sharing one in-memory broker
async fn system() -> (Arc<MemoryBroker>, Router) {
    let broker = Arc::new(MemoryBroker::new());
    let channels = Arc::new(ChannelRegistry::new(default_channels()).unwrap());
    let rpc = RpcSettings {
        default_timeout_ms: 2_000,
        ..RpcSettings::default()
    };

    for kind in ServiceKind::ALL {
        let registry = kind.registry(broker.clone(), channels.clone(), &rpc).await.unwrap();
        let worker = Worker::new(
            kind.service_name(),
            &channels,
            broker.clone(),
            registry,
            WorkerConfig::default(),
        )
        .unwrap();
        worker.listen().await.unwrap();
    }

    let client = RpcClient::start("api_gateway", broker.clone(), channels, &rpc).await.unwrap();
    (broker, create_router(GatewayState::new(client, RouteTable::default())))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = body.map(|b| b.to_string()).unwrap_or_default();
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn user_lifecycle_through_gateway() {
    let (_broker, app) = system().await;

    let (status, created) = send(&app, "POST", "/user", Some(json!({"email": "a@b.com", "password": "x"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["id"], 1);
    assert_eq!(created["email"], "a@b.com");
    assert!(created.get("password").is_none());

    let (status, fetched) = send(&app, "GET", "/user/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, body) = send(&app, "POST", "/user", Some(json!({"email": "a@b.com"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "Conflict");

    let (status, updated) = send(&app, "PUT", "/user/1", Some(json!({"name": "Ann"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Ann");
    assert_eq!(updated["email"], "a@b.com");

    let (status, deleted) = send(&app, "DELETE", "/user/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted, json!(true));

    let (status, all) = send(&app, "GET", "/admin/user", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all, json!([]));
}

#[tokio::test]
async fn missing_user_is_not_found_not_transport_error() {
    let (_broker, app) = system().await;

    let (status, body) = send(&app, "GET", "/user/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

#[tokio::test]
async fn task_creation_schedules_through_front_worker() {
    let (_broker, app) = system().await;

    let (status, body) = send(&app, "POST", "/task/create-task", Some(json!({"title": "early"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unscheduled");

    for name in ["a", "b"] {
        let (status, _) = send(&app, "POST", "/admin/front", Some(json!({"name": name, "centerId": 1}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, task) = send(
        &app,
        "POST",
        "/task",
        Some(json!({"title": "wash", "estimatedSeconds": 120})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "scheduled");
    assert_eq!(task["frontId"], 1);

    let (_, best) = send(&app, "GET", "/front/get-front-for-task", None).await;
    assert_eq!(best["id"], 2);

    let (_, front) = send(&app, "GET", "/front/1", None).await;
    assert_eq!(front["length"], 1);
    assert_eq!(front["timeToCompleteAllTasks"], 120);
}

#[tokio::test]
async fn center_lookup_by_front() {
    let (_broker, app) = system().await;

    let (status, center) = send(&app, "POST", "/center", Some(json!({"name": "north", "frontIds": [4]}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, found) = send(
        &app,
        "POST",
        "/center/get-center-with-front-id",
        Some(json!({"frontId": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found, center);
}

#[tokio::test]
async fn unknown_operation_and_route() {
    let (_broker, app) = system().await;

    let (status, body) = send(&app, "POST", "/user/login", Some(json!({"email": "a@b.com"}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "UnknownPattern");

    let (status, body) = send(&app, "GET", "/billing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "Unroutable");
}

#[tokio::test]
async fn broker_outage_surfaces_as_503() {
    let (broker, app) = system().await;
    broker.set_online(false);

    let (status, body) = send(&app, "GET", "/center", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "TransportUnavailable");
}
