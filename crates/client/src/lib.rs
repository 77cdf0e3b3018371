//! `ra-client` — a thin REST client for the agent daemon's HTTP API.
//!
//! Every method maps onto exactly one daemon route and returns the JSON
//! body already unwrapped from its envelope (`{"sessions": [...]}`,
//! `{"session": {...}}`) the way the daemon sends it.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// An error from a remote call: connection failure, timeout, a non-2xx
/// response, or a malformed body.
#[derive(Debug, thiserror::Error)]
pub enum RemoteAgentError {
    #[error("{message}")]
    Message { message: String },
    #[error("[HTTP {status_code}] {message}")]
    Http { message: String, status_code: u16 },
}

impl RemoteAgentError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemoteAgentError::Http { status_code, .. } => Some(*status_code),
            RemoteAgentError::Message { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RemoteAgentError>;

/// A lightweight client for the agent daemon's REST API.
///
/// Created once and reused for the process lifetime; the underlying
/// `reqwest::Client` keeps its own connection pool.
#[derive(Debug, Clone)]
pub struct RemoteAgentClient {
    http: Client,
    endpoint: String,
    token: Option<String>,
}

impl RemoteAgentClient {
    /// Build a client against `endpoint`, normalizing it to an absolute
    /// `http(s)://host:port` URL with no trailing slash. A bare
    /// `host:port` is assumed to be plain HTTP.
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let mut normalized = endpoint.trim().trim_end_matches('/').to_string();
        if !normalized.starts_with("http://") && !normalized.starts_with("https://") {
            normalized = format!("http://{normalized}");
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteAgentError::Message { message: format!("构建客户端失败：{e}") })?;
        Ok(Self { http, endpoint: normalized, token })
    }

    /// Build a client with the default 30s timeout.
    pub fn with_default_timeout(endpoint: &str, token: Option<String>) -> Result<Self> {
        Self::new(endpoint, token, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub async fn health(&self) -> Result<Value> {
        self.request(Method::GET, "/health", None, &[]).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<Value>> {
        let payload = self.request(Method::GET, "/sessions", None, &[]).await?;
        match payload.get("sessions") {
            Some(Value::Array(sessions)) => Ok(sessions.clone()),
            _ => Err(RemoteAgentError::Message { message: "服务端返回了无效的 sessions 字段。".into() }),
        }
    }

    pub async fn create_session(&self, session_id: Option<&str>) -> Result<Value> {
        let mut body = json!({});
        if let Some(id) = session_id {
            body["session_id"] = json!(id);
        }
        self.request(Method::POST, "/sessions", Some(&body), &[]).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Value> {
        let payload = self.request(Method::GET, &format!("/sessions/{session_id}"), None, &[]).await?;
        match payload.get("session") {
            Some(session) if session.is_object() => Ok(session.clone()),
            _ => Err(RemoteAgentError::Message { message: "服务端返回了无效的 session 字段。".into() }),
        }
    }

    pub async fn submit_turn(&self, session_id: &str, user_input: &str) -> Result<Value> {
        let body = json!({"input": user_input});
        self.request(Method::POST, &format!("/sessions/{session_id}/turns"), Some(&body), &[]).await
    }

    pub async fn clear_session(&self, session_id: &str) -> Result<Value> {
        self.request(Method::POST, &format!("/sessions/{session_id}/clear"), Some(&json!({})), &[]).await
    }

    pub async fn cancel_session(&self, session_id: &str) -> Result<Value> {
        self.request(Method::POST, &format!("/sessions/{session_id}/cancel"), Some(&json!({})), &[]).await
    }

    pub async fn shutdown(&self) -> Result<Value> {
        self.request(Method::POST, "/shutdown", Some(&json!({})), &[]).await
    }

    pub async fn get_events(&self, session_id: &str, after: u64, wait_ms: u64, limit: u64) -> Result<Value> {
        let query = [
            ("after", after.to_string()),
            ("wait_ms", wait_ms.to_string()),
            ("limit", limit.max(1).to_string()),
        ];
        self.request(Method::GET, &format!("/sessions/{session_id}/events"), None, &query).await
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&B>,
        query: &[(&str, String)],
    ) -> Result<Value> {
        let url = format!("{}{path}", self.endpoint);
        let mut builder = self.http.request(method, &url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = payload {
            builder = builder.json(body);
        }
        if let Some(ref token) = self.token {
            builder = builder.header("X-Agent-Token", token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteAgentError::Message { message: format!("请求超时：{e}") }
            } else {
                RemoteAgentError::Message { message: format!("连接服务失败：{e}") }
            }
        })?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| RemoteAgentError::Message { message: format!("读取响应失败：{e}") })?;

        if !status.is_success() {
            return Err(RemoteAgentError::Http {
                message: Self::parse_error_message(&raw, status),
                status_code: status.as_u16(),
            });
        }

        if raw.is_empty() {
            return Ok(json!({}));
        }
        let parsed: Value = serde_json::from_str(&raw)
            .map_err(|e| RemoteAgentError::Message { message: format!("服务端返回了非 JSON 内容：{e}") })?;
        if !parsed.is_object() {
            return Err(RemoteAgentError::Message { message: "服务端返回了非对象结构。".into() });
        }
        Ok(parsed)
    }

    fn parse_error_message(raw: &str, status: StatusCode) -> String {
        if raw.is_empty() {
            return status.to_string();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => match map.get("error").and_then(Value::as_str) {
                Some(message) if !message.is_empty() => message.to_string(),
                _ => status.to_string(),
            },
            _ => raw.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_host_to_http() {
        let client = RemoteAgentClient::with_default_timeout("localhost:8765", None).unwrap();
        assert_eq!(client.endpoint, "http://localhost:8765");
    }

    #[test]
    fn preserves_explicit_scheme_and_strips_trailing_slash() {
        let client = RemoteAgentClient::with_default_timeout("https://example.com/", None).unwrap();
        assert_eq!(client.endpoint, "https://example.com");
    }

    #[test]
    fn http_error_formats_status_prefix() {
        let err = RemoteAgentError::Http { message: "not found".into(), status_code: 404 };
        assert_eq!(err.to_string(), "[HTTP 404] not found");
        assert_eq!(err.status_code(), Some(404));
    }
}
