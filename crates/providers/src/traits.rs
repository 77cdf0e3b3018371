use async_trait::async_trait;
use ra_domain::{FunctionCallRecord, Result, ToolDefinition};
use serde_json::Value;

/// Normalized outcome of a single model call, before history mutation.
#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    /// The model's text response, empty when it only issued tool calls.
    pub text: String,
    pub function_calls: Vec<FunctionCallRecord>,
    /// The provider-native message to append to history as the model's turn
    /// (a `Content` for Google, an `{role, content, tool_calls?}` object for
    /// OpenAI-style). Appended verbatim by the caller.
    pub assistant_payload: Value,
}

/// Translates between the reasoning loop's provider-agnostic calls and one
/// LLM vendor's wire dialect.
///
/// History is kept as opaque, provider-native `serde_json::Value`s
/// throughout — an adapter is free to shape each message however its
/// dialect requires, as long as every message carries a top-level `role`
/// field (see [`ra_domain::history_role`]).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Append a user turn to `history` in this dialect's message shape.
    fn append_user_message(&self, history: &mut Vec<Value>, user_input: &str);

    /// Call the model once with the current history and tool declarations,
    /// retrying internally on rate-limit responses.
    async fn invoke(
        &self,
        history: &[Value],
        tools: &[ToolDefinition],
        on_retry: &mut dyn FnMut(crate::retry::RetryNotice),
    ) -> Result<InvokeOutcome>;

    /// Append the results of this turn's tool calls to `history`.
    fn append_tool_results(&self, history: &mut Vec<Value>, results: &[(FunctionCallRecord, String)]);

    /// Append a locally-synthesized assistant text (the call-cap fallback
    /// answer) to `history`, as though the model had said it.
    fn append_assistant_text(&self, history: &mut Vec<Value>, text: &str);

    /// The model identifier this adapter is configured to call.
    fn model_id(&self) -> &str;
}
