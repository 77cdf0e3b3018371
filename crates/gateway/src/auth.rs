use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::api_error;
use crate::state::AppState;

const TOKEN_HEADER: &str = "x-agent-token";

/// Reject requests carrying the wrong `X-Agent-Token`. A daemon started
/// without a configured token accepts every request unauthenticated.
pub async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.auth_token.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    if provided == Some(expected) {
        next.run(request).await
    } else {
        api_error(StatusCode::UNAUTHORIZED, "无效或缺失的访问令牌。")
    }
}
