//! HTTP surface: one route per session-lifecycle and turn-submission
//! operation, plus health and shutdown.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::require_token;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/events", get(get_events))
        .route("/sessions/:id/turns", post(submit_turn))
        .route("/sessions/:id/clear", post(clear_session))
        .route("/sessions/:id/cancel", post(cancel_session))
        .route("/shutdown", post(shutdown))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state)
}

pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"error": message.into(), "status": status.as_u16()}))).into_response()
}

fn not_found(session_id: &str) -> Response {
    api_error(StatusCode::NOT_FOUND, format!("会话不存在或仍在初始化：{session_id}"))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"sessions": state.sessions.list_sessions()}))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.get_session(&id) {
        Ok(session) => Json(json!({"session": session.status()})).into_response(),
        Err(_) => not_found(&id),
    }
}

#[derive(Debug, Deserialize, Default)]
struct EventsQuery {
    after: Option<String>,
    wait_ms: Option<String>,
    limit: Option<String>,
}

/// Parse a query parameter as a clamped integer, falling back to `default`
/// on anything unparseable rather than rejecting the request.
fn clamp(value: Option<&str>, default: i64, min: i64, max: i64) -> i64 {
    value
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

async fn get_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let session = match state.sessions.get_session(&id) {
        Ok(session) => session,
        Err(_) => return not_found(&id),
    };
    let after = clamp(query.after.as_deref(), 0, 0, 1_000_000_000_000) as u64;
    let wait_ms = clamp(query.wait_ms.as_deref(), 0, 0, 30_000) as u64;
    let limit = clamp(query.limit.as_deref(), 200, 1, 1_000) as usize;
    Json(session.get_events(after, wait_ms, limit).await).into_response()
}

/// Parse a request body leniently the way the daemon always has: missing,
/// empty, or non-object JSON is treated as `{}` rather than an error.
fn parse_lenient_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return json!({});
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) if value.is_object() => value,
        _ => json!({}),
    }
}

async fn create_session(State(state): State<AppState>, bytes: axum::body::Bytes) -> Response {
    let body = parse_lenient_body(&bytes);
    let requested_id = match body.get("session_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return api_error(StatusCode::BAD_REQUEST, "session_id 必须是字符串。"),
    };
    match state.sessions.create_session(requested_id) {
        Ok(session) => (
            StatusCode::CREATED,
            Json(json!({"session_id": session.session_id(), "session": session.status()})),
        )
            .into_response(),
        Err(e) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn submit_turn(State(state): State<AppState>, Path(id): Path<String>, bytes: axum::body::Bytes) -> Response {
    let session = match state.sessions.get_session(&id) {
        Ok(session) => session,
        Err(_) => return not_found(&id),
    };
    let body = parse_lenient_body(&bytes);
    let input = match body.get("input") {
        Some(Value::String(s)) => s.clone(),
        _ => return api_error(StatusCode::BAD_REQUEST, "input 字段必须是字符串。"),
    };
    match session.submit_turn(&input) {
        Ok(turn_id) => (
            StatusCode::ACCEPTED,
            Json(json!({"session_id": session.session_id(), "turn_id": turn_id})),
        )
            .into_response(),
        Err(e) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn clear_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let session = match state.sessions.get_session(&id) {
        Ok(session) => session,
        Err(_) => return not_found(&id),
    };
    let (ok, message) = session.clear();
    let status = if ok { StatusCode::OK } else { StatusCode::CONFLICT };
    (status, Json(json!({"ok": ok, "message": message}))).into_response()
}

async fn cancel_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let session = match state.sessions.get_session(&id) {
        Ok(session) => session,
        Err(_) => return not_found(&id),
    };
    Json(session.cancel()).into_response()
}

async fn shutdown(State(state): State<AppState>) -> impl IntoResponse {
    state.shutdown.notify_one();
    Json(json!({"ok": true, "message": "正在关闭守护进程。"}))
}
