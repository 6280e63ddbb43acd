//! API route definitions.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::state::AppState;
use crate::encoding::Encoding;
use crate::error::ClientError;
use crate::loadtest::LoadTestConfig;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route(
            "/connections",
            get(list_connections).post(open_connection).delete(close_all),
        )
        .route("/connections/count", get(connection_count))
        .route("/connections/{id}", delete(close_connection))
        .route("/send", post(send))
        .route("/loadtest/start", post(start_load_test))
        .route("/loadtest/stop", post(stop_load_test))
        .route("/loadtest/status", get(load_test_status))
        .route("/loadtest/config", get(load_test_config))
        .route("/loadtest/default-config", get(default_load_test_config))
        .route("/events", get(events))
}

fn error_body(err: &ClientError) -> Value {
    json!({ "code": err.code(), "message": err.to_string() })
}

fn error_response(status: StatusCode, err: &ClientError) -> Response {
    (status, Json(json!({ "error": error_body(err) }))).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    host: String,
    port: u16,
}

async fn list_connections(State(state): State<AppState>) -> Json<Value> {
    let connections = state.manager.connections().await;
    let total = connections.len();
    Json(json!({ "data": connections, "meta": { "total": total } }))
}

async fn connection_count(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": { "count": state.manager.connection_count().await } }))
}

async fn open_connection(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Response {
    match state.manager.connect(&req.host, req.port).await {
        Ok(id) => {
            let count = state.manager.connection_count().await;
            (
                StatusCode::CREATED,
                Json(json!({ "data": { "id": id, "count": count } })),
            )
                .into_response()
        }
        Err(e) => error_response(StatusCode::BAD_GATEWAY, &e),
    }
}

async fn close_all(State(state): State<AppState>) -> Json<Value> {
    let closed = state.manager.disconnect(None).await;
    Json(json!({ "data": { "closed": closed, "count": state.manager.connection_count().await } }))
}

/// Unknown ids are acknowledged with `closed: false`.
async fn close_connection(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    let closed = state.manager.disconnect(Some(&id)).await;
    Json(json!({ "data": { "closed": closed, "count": state.manager.connection_count().await } }))
}

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SendRequest {
    message: String,
    #[serde(default)]
    encoding: Encoding,
    #[serde(default)]
    id: Option<String>,
}

/// Always acknowledged: a failed send is reported in the body and on the
/// event feed, never as an HTTP error.
async fn send(State(state): State<AppState>, Json(req): Json<SendRequest>) -> Json<Value> {
    match state
        .manager
        .send(&req.message, req.encoding, req.id.as_deref())
        .await
    {
        Ok(delivered) => Json(json!({ "data": { "accepted": true, "delivered": delivered } })),
        Err(e) => Json(json!({
            "data": { "accepted": true, "delivered": 0 },
            "error": error_body(&e)
        })),
    }
}

// ---------------------------------------------------------------------------
// Load test
// ---------------------------------------------------------------------------

async fn start_load_test(
    State(state): State<AppState>,
    Json(config): Json<LoadTestConfig>,
) -> Response {
    match state.load_generator.start(config).await {
        Ok(()) => Json(json!({ "data": state.load_generator.status().await })).into_response(),
        Err(e @ ClientError::ConfigValidation(_)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, &e)
        }
        Err(e) => error_response(StatusCode::CONFLICT, &e),
    }
}

async fn stop_load_test(State(state): State<AppState>) -> Json<Value> {
    let stopped = state.load_generator.stop().await;
    Json(json!({ "data": { "stopped": stopped, "active": false } }))
}

async fn load_test_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.load_generator.status().await }))
}

async fn load_test_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.load_generator.config().await }))
}

async fn default_load_test_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.load_generator.default_config() }))
}

// ---------------------------------------------------------------------------
// Event feed
// ---------------------------------------------------------------------------

async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.notifier.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let event = Event::default()
                        .event(notification.name())
                        .json_data(&notification)
                        .unwrap_or_else(|_| Event::default().event(notification.name()));
                    return Some((Ok::<_, Infallible>(event), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event feed subscriber lagged, notifications dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
