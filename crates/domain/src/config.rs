use crate::error::{Error, Result};
use std::env;
use std::path::Path;

/// Which LLM dialect a session's provider adapter speaks.
///
/// `Gemini` and `Kimi` are the two names the daemon accepts; `Kimi` covers
/// any Moonshot-compatible OpenAI-style deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    Kimi,
}

impl Provider {
    /// Normalize a user-supplied provider name. Case-insensitive; the
    /// Moonshot/OpenAI-compat aliases all resolve to `Kimi` since the wire
    /// dialect is identical.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "kimi" | "moonshot" | "openai_compat" | "openai-compatible" => Ok(Provider::Kimi),
            other => Err(Error::Config(format!(
                "unsupported LLM_PROVIDER: {other}, expected one of: gemini, kimi"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Kimi => "kimi",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.5-flash",
            Provider::Kimi => "kimi-k2-turbo-preview",
        }
    }
}

/// Read an environment variable through the `.env`-aware lookup chain:
/// real environment first, falling back to whatever [`load_dotenv`] loaded.
/// Returns `None` for unset or empty values, matching the original's
/// "empty string counts as unset" convention.
fn get_config_value(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| env::var(k).ok())
        .filter(|v| !v.is_empty())
}

/// Resolve the configured provider, defaulting to `gemini` when unset.
pub fn load_llm_provider() -> Result<Provider> {
    match get_config_value(&["LLM_PROVIDER"]) {
        Some(raw) => Provider::parse(&raw),
        None => Ok(Provider::Gemini),
    }
}

/// Resolve the model id for `provider`: a provider-specific env var, then
/// the generic `LLM_MODEL_ID`, then the built-in default.
pub fn load_model_id(provider: Provider) -> String {
    let keys: &[&str] = match provider {
        Provider::Gemini => &["GEMINI_MODEL_ID", "LLM_MODEL_ID"],
        Provider::Kimi => &["KIMI_MODEL_ID", "LLM_MODEL_ID"],
    };
    get_config_value(keys).unwrap_or_else(|| provider.default_model().to_string())
}

/// Resolve the API key for `provider`. Kimi checks `MOONSHOT_API_KEY`
/// (preferred), then `KIMI_API_KEY`, then `OPENAI_API_KEY`.
pub fn load_provider_api_key(provider: Provider) -> Result<String> {
    let keys: &[&str] = match provider {
        Provider::Gemini => &["GEMINI_API_KEY"],
        Provider::Kimi => &["MOONSHOT_API_KEY", "KIMI_API_KEY", "OPENAI_API_KEY"],
    };
    get_config_value(keys).ok_or_else(|| {
        Error::Config(format!(
            "missing API key for provider {}: set one of {}",
            provider.as_str(),
            keys.join(", ")
        ))
    })
}

/// Resolve the Kimi OpenAI-compatible base URL.
pub fn load_kimi_base_url() -> String {
    get_config_value(&["KIMI_BASE_URL", "OPENAI_BASE_URL"])
        .unwrap_or_else(|| "https://api.moonshot.cn/v1".to_string())
}

/// Resolved settings for the daemon's single provider-backed runtime, shared
/// across all sessions: which dialect, which model, which credentials, and
/// where to send requests.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub model_id: String,
    pub api_key: String,
    pub base_url: String,
}

impl ProviderConfig {
    /// Resolve the daemon's provider configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let provider = load_llm_provider()?;
        let model_id = load_model_id(provider);
        let api_key = load_provider_api_key(provider)?;
        let base_url = match provider {
            Provider::Gemini => "https://generativelanguage.googleapis.com".to_string(),
            Provider::Kimi => load_kimi_base_url(),
        };
        Ok(Self {
            provider,
            model_id,
            api_key,
            base_url,
        })
    }
}

const DEFAULT_AGENTD_HOST: &str = "127.0.0.1";
const DEFAULT_AGENTD_PORT: u16 = 8765;

/// Daemon-wide settings read once at startup: bind address, shared auth
/// token, and per-session resource limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub auth_token: Option<String>,
    pub max_events_per_session: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let host = get_config_value(&["AGENTD_HOST"]).unwrap_or_else(|| DEFAULT_AGENTD_HOST.to_string());
        let port = get_config_value(&["AGENTD_PORT"])
            .and_then(|v| v.parse::<u16>().ok())
            .filter(|&p| p > 0)
            .unwrap_or(DEFAULT_AGENTD_PORT);
        let auth_token = get_config_value(&["AGENTD_TOKEN"]);
        let max_events_per_session = get_config_value(&["AGENTD_MAX_EVENTS"])
            .and_then(|v| v.parse().ok())
            .unwrap_or(2000);
        Self {
            host,
            port,
            auth_token,
            max_events_per_session,
        }
    }
}

/// Load `.env` the way the daemon and its CLI both expect: the file is read
/// from the current working directory, with neither presence required.
///
/// Mirrors `repo_agent/config/settings.py`, which additionally checks the
/// package's own install directory; since this crate is installed as a
/// compiled binary rather than imported source, only the cwd lookup applies.
pub fn load_dotenv() {
    if Path::new(".env").is_file() {
        let _ = dotenvy::from_filename(".env");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_provider_env() {
        for key in [
            "LLM_PROVIDER",
            "GEMINI_MODEL_ID",
            "KIMI_MODEL_ID",
            "LLM_MODEL_ID",
            "GEMINI_API_KEY",
            "MOONSHOT_API_KEY",
            "KIMI_API_KEY",
            "OPENAI_API_KEY",
            "KIMI_BASE_URL",
            "OPENAI_BASE_URL",
            "AGENTD_HOST",
            "AGENTD_PORT",
            "AGENTD_TOKEN",
            "AGENTD_MAX_EVENTS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn provider_parse_accepts_aliases() {
        let _guard = ENV_LOCK.lock().unwrap();
        assert_eq!(Provider::parse("Gemini").unwrap(), Provider::Gemini);
        assert_eq!(Provider::parse("KIMI").unwrap(), Provider::Kimi);
        assert_eq!(Provider::parse("moonshot").unwrap(), Provider::Kimi);
        assert_eq!(Provider::parse("openai_compat").unwrap(), Provider::Kimi);
        assert!(Provider::parse("bogus").is_err());
    }

    #[test]
    fn load_llm_provider_defaults_to_gemini() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_provider_env();
        assert_eq!(load_llm_provider().unwrap(), Provider::Gemini);
    }

    #[test]
    fn kimi_api_key_falls_back_through_aliases() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_provider_env();
        env::set_var("OPENAI_API_KEY", "sk-fallback");
        assert_eq!(load_provider_api_key(Provider::Kimi).unwrap(), "sk-fallback");
        clear_provider_env();
    }

    #[test]
    fn server_config_defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_provider_env();
        let cfg = ServerConfig::from_env();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8765);
        assert!(cfg.auth_token.is_none());
        assert_eq!(cfg.max_events_per_session, 2000);
    }
}
