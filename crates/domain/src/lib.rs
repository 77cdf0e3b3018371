pub mod config;
pub mod error;
pub mod event;
pub mod tool;

pub use config::{
    load_dotenv, load_kimi_base_url, load_llm_provider, load_model_id, load_provider_api_key,
    Provider, ProviderConfig, ServerConfig,
};
pub use error::{Error, Result};
pub use event::{now_unix, AgentEvent, EventKind, TurnRequest, TurnStatus};
pub use tool::{canonical_json, history_role, FunctionCallRecord, ToolDefinition};
