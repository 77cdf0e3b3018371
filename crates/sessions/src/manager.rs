use crate::session::{AgentSession, SessionStatus};
use parking_lot::Mutex;
use ra_domain::{Error, ProviderConfig, Result};
use ra_providers::ProviderAdapter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Owns every session for one running daemon and the shared provider
/// adapter they all call through.
///
/// Sessions are keyed by a placeholder-first protocol: a slot is reserved
/// under the lock before the (fallible) session is actually built, so two
/// concurrent requests for the same generated id can never both succeed.
pub struct SessionManager {
    adapter: Arc<dyn ProviderAdapter>,
    provider_name: String,
    model_id: String,
    workspace_root: PathBuf,
    max_events_per_session: usize,
    sessions: Mutex<HashMap<String, Option<Arc<AgentSession>>>>,
}

impl SessionManager {
    pub fn new(config: &ProviderConfig, workspace_root: PathBuf, max_events_per_session: usize) -> Self {
        Self {
            adapter: ra_providers::make_adapter(config),
            provider_name: config.provider.as_str().to_string(),
            model_id: config.model_id.clone(),
            workspace_root,
            max_events_per_session,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create and start a new session, optionally under a caller-supplied
    /// id. A server-generated id is 12 hex characters, matching a UUIDv4's
    /// first half.
    pub fn create_session(&self, session_id: Option<String>) -> Result<Arc<AgentSession>> {
        let new_id = session_id.unwrap_or_else(|| {
            let full = Uuid::new_v4().simple().to_string();
            full[..12].to_string()
        });

        {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(&new_id) {
                return Err(Error::Other(format!("会话已存在：{new_id}")));
            }
            sessions.insert(new_id.clone(), None);
        }

        let session = Arc::new(AgentSession::new(
            new_id.clone(),
            self.provider_name.clone(),
            self.model_id.clone(),
            Arc::clone(&self.adapter),
            self.workspace_root.clone(),
            self.max_events_per_session,
        ));
        session.start();

        self.sessions.lock().insert(new_id, Some(Arc::clone(&session)));
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Arc<AgentSession>> {
        self.sessions
            .lock()
            .get(session_id)
            .and_then(|slot| slot.clone())
            .ok_or_else(|| Error::Other(format!("会话不存在或仍在初始化：{session_id}")))
    }

    pub fn list_sessions(&self) -> Vec<SessionStatus> {
        let sessions: Vec<Arc<AgentSession>> = self
            .sessions
            .lock()
            .values()
            .filter_map(|slot| slot.clone())
            .collect();
        sessions.iter().map(|s| s.status()).collect()
    }

    pub async fn stop_all(&self) {
        let sessions: Vec<Arc<AgentSession>> = {
            let mut sessions = self.sessions.lock();
            let values = sessions.values().filter_map(|slot| slot.clone()).collect();
            sessions.clear();
            values
        };
        for session in sessions {
            session.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_domain::Provider;

    fn test_config() -> ProviderConfig {
        ProviderConfig {
            provider: Provider::Kimi,
            model_id: "test-model".into(),
            api_key: "test-key".into(),
            base_url: "http://localhost:0".into(),
        }
    }

    #[tokio::test]
    async fn create_session_rejects_duplicate_id() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(&test_config(), dir.path().to_path_buf(), 100);
        manager.create_session(Some("fixed".into())).unwrap();
        let err = manager.create_session(Some("fixed".into())).unwrap_err();
        assert!(err.to_string().contains("已存在"));
        manager.stop_all().await;
    }

    #[tokio::test]
    async fn generated_session_id_is_twelve_hex_chars() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(&test_config(), dir.path().to_path_buf(), 100);
        let session = manager.create_session(None).unwrap();
        assert_eq!(session.session_id().len(), 12);
        assert!(session.session_id().chars().all(|c| c.is_ascii_hexdigit()));
        manager.stop_all().await;
    }

    #[tokio::test]
    async fn get_session_reports_missing_id() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(&test_config(), dir.path().to_path_buf(), 100);
        assert!(manager.get_session("nope").is_err());
    }
}
