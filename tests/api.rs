//! Control API routes, driven through the router without binding a port.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{closed_port, spawn_echo_server, test_state};

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = sockprobe::api::router(test_state());
    let (status, body) = call(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = sockprobe::api::router(test_state());
    let (status, _) = call(&app, "GET", "/api/v1/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_connection_lifecycle_over_http() {
    let addr = spawn_echo_server().await;
    let app = sockprobe::api::router(test_state());

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/connections",
        Some(json!({ "host": "127.0.0.1", "port": addr.port() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["id"], "client-1");
    assert_eq!(body["data"]["count"], 1);

    let (_, body) = call(&app, "GET", "/api/v1/connections/count", None).await;
    assert_eq!(body["data"]["count"], 1);

    let (_, body) = call(&app, "GET", "/api/v1/connections", None).await;
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["host"], "127.0.0.1");
    assert_eq!(body["data"][0]["port"], addr.port());

    let (status, body) = call(&app, "DELETE", "/api/v1/connections/client-99", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["closed"], false);
    assert_eq!(body["data"]["count"], 1);

    let (status, body) = call(&app, "DELETE", "/api/v1/connections", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["closed"], true);
    assert_eq!(body["data"]["count"], 0);
}

#[tokio::test]
async fn test_connect_failure_is_bad_gateway() {
    let dead = closed_port().await;
    let app = sockprobe::api::router(test_state());

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/connections",
        Some(json!({ "host": "127.0.0.1", "port": dead.port() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "transport_error");
}

#[tokio::test]
async fn test_send_failures_are_still_acknowledged() {
    let addr = spawn_echo_server().await;
    let state = test_state();
    let app = sockprobe::api::router(state.clone());

    let (status, body) = call(&app, "POST", "/api/v1/send", Some(json!({ "message": "hi" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["accepted"], true);
    assert_eq!(body["error"]["code"], "not_connected");

    state.manager.connect("127.0.0.1", addr.port()).await.expect("connect");

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/send",
        Some(json!({ "message": "hi", "id": "client-42" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["delivered"], 0);
    assert_eq!(body["error"]["code"], "unknown_connection");

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/send",
        Some(json!({ "message": "aGk=", "encoding": "base64" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["delivered"], 1);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_load_test_routes() {
    let addr = spawn_echo_server().await;
    let state = test_state();
    let app = sockprobe::api::router(state.clone());

    let (_, body) = call(&app, "GET", "/api/v1/loadtest/default-config", None).await;
    assert_eq!(body["data"]["interval"], 100);
    assert_eq!(body["data"]["randomLength"], 100);
    assert_eq!(body["data"]["encoding"], "utf8");

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/loadtest/start",
        Some(json!({ "interval": 1000, "randomLength": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "not_connected");

    state.manager.connect("127.0.0.1", addr.port()).await.expect("connect");

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/loadtest/start",
        Some(json!({ "charset": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "config_validation");

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/loadtest/start",
        Some(json!({ "randomLength": 1_000_000_000_000_000u64 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "config_validation");
    assert!(!state.load_generator.is_active().await);

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/loadtest/start",
        Some(json!({ "interval": 1000, "randomLength": 5, "charset": "Q" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], true);

    let (_, body) = call(&app, "GET", "/api/v1/loadtest/status", None).await;
    assert_eq!(body["data"]["active"], true);

    let (_, body) = call(&app, "GET", "/api/v1/loadtest/config", None).await;
    assert_eq!(body["data"]["randomLength"], 5);
    assert_eq!(body["data"]["charset"], "Q");

    let (_, body) = call(&app, "POST", "/api/v1/loadtest/stop", None).await;
    assert_eq!(body["data"]["stopped"], true);

    let (_, body) = call(&app, "POST", "/api/v1/loadtest/stop", None).await;
    assert_eq!(body["data"]["stopped"], false);
}
