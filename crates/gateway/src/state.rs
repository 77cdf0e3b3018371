use ra_sessions::SessionManager;
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub auth_token: Option<String>,
    pub shutdown: Arc<Notify>,
}
