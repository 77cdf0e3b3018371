//! Kimi / Moonshot dialect adapter: standard OpenAI chat-completions wire
//! format, called directly over `reqwest`.

use crate::retry::{call_with_retry, RetryNotice};
use crate::traits::{InvokeOutcome, ProviderAdapter};
use async_trait::async_trait;
use ra_domain::{Error, FunctionCallRecord, ProviderConfig, Result, ToolDefinition};
use serde_json::{json, Value};

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_id: String,
}

impl OpenAiCompatProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model_id: config.model_id.clone(),
        }
    }

    fn tools_payload(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    async fn chat_completions(&self, history: &[Value], tools: &[ToolDefinition]) -> Result<Value> {
        let body = json!({
            "model": self.model_id,
            "messages": history,
            "tools": Self::tools_payload(tools),
            "tool_choice": "auto",
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: "kimi".into(),
                message: format!("{status}: {text}"),
            });
        }
        serde_json::from_str(&text).map_err(Error::Json)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatProvider {
    fn append_user_message(&self, history: &mut Vec<Value>, user_input: &str) {
        history.push(json!({ "role": "user", "content": user_input }));
    }

    async fn invoke(
        &self,
        history: &[Value],
        tools: &[ToolDefinition],
        on_retry: &mut dyn FnMut(RetryNotice),
    ) -> Result<InvokeOutcome> {
        let response = call_with_retry(
            || self.chat_completions(history, tools),
            |notice| on_retry(notice),
        )
        .await?;

        let message = response["choices"][0]["message"].clone();
        let text = message.get("content").and_then(Value::as_str).unwrap_or("").to_string();
        let raw_tool_calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut function_calls = Vec::new();
        for call in &raw_tool_calls {
            let call_id = call.get("id").and_then(Value::as_str).map(String::from);
            let name = call["function"]["name"].as_str().unwrap_or("").to_string();
            let args_text = call["function"]["arguments"].as_str().unwrap_or("{}");
            let args = serde_json::from_str(args_text).unwrap_or_else(|_| json!({}));
            function_calls.push(FunctionCallRecord {
                name,
                args,
                call_id,
            });
        }

        let mut assistant_payload = json!({
            "role": "assistant",
            "content": text,
        });
        if !raw_tool_calls.is_empty() {
            assistant_payload["tool_calls"] = Value::Array(raw_tool_calls);
        }

        Ok(InvokeOutcome {
            text,
            function_calls,
            assistant_payload,
        })
    }

    fn append_tool_results(&self, history: &mut Vec<Value>, results: &[(FunctionCallRecord, String)]) {
        for (fc, result) in results {
            history.push(json!({
                "role": "tool",
                "tool_call_id": fc.call_id.clone().unwrap_or_default(),
                "content": result,
            }));
        }
    }

    fn append_assistant_text(&self, history: &mut Vec<Value>, text: &str) {
        history.push(json!({ "role": "assistant", "content": text }));
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_payload_wraps_each_definition() {
        let tools = vec![ToolDefinition {
            name: "search_files".into(),
            description: "search".into(),
            parameters: json!({"type": "object"}),
        }];
        let payload = OpenAiCompatProvider::tools_payload(&tools);
        assert_eq!(payload[0]["type"], "function");
        assert_eq!(payload[0]["function"]["name"], "search_files");
    }
}
