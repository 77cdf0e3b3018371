//! Gemini dialect adapter, speaking the Generative Language REST API
//! directly over `reqwest` rather than through a vendor SDK.

use crate::retry::{call_with_retry, RetryNotice};
use crate::traits::{InvokeOutcome, ProviderAdapter};
use async_trait::async_trait;
use ra_domain::{Error, FunctionCallRecord, ProviderConfig, Result, ToolDefinition};
use serde_json::{json, Value};

pub struct GoogleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_id: String,
}

impl GoogleProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model_id: config.model_id.clone(),
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model_id, self.api_key
        )
    }

    fn tools_payload(tools: &[ToolDefinition]) -> Value {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        json!([{ "functionDeclarations": declarations }])
    }

    async fn generate_content(&self, history: &[Value], tools: &[ToolDefinition]) -> Result<Value> {
        let body = json!({
            "contents": history,
            "systemInstruction": { "parts": [{ "text": crate::SYSTEM_PROMPT }] },
            "tools": Self::tools_payload(tools),
        });

        let response = self
            .client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: "gemini".into(),
                message: format!("{status}: {text}"),
            });
        }
        serde_json::from_str(&text).map_err(Error::Json)
    }
}

#[async_trait]
impl ProviderAdapter for GoogleProvider {
    fn append_user_message(&self, history: &mut Vec<Value>, user_input: &str) {
        history.push(json!({
            "role": "user",
            "parts": [{ "text": user_input }],
        }));
    }

    async fn invoke(
        &self,
        history: &[Value],
        tools: &[ToolDefinition],
        on_retry: &mut dyn FnMut(RetryNotice),
    ) -> Result<InvokeOutcome> {
        let response = call_with_retry(
            || self.generate_content(history, tools),
            |notice| on_retry(notice),
        )
        .await?;

        let candidate = response["candidates"].get(0).cloned().unwrap_or(Value::Null);
        let mut content = candidate["content"].clone();
        if content.is_null() {
            content = json!({ "role": "model", "parts": [] });
        }
        let parts = content["parts"].as_array().cloned().unwrap_or_default();

        let mut text = String::new();
        let mut function_calls = Vec::new();
        for part in &parts {
            if let Some(t) = part.get("text").and_then(Value::as_str) {
                text.push_str(t);
            }
            if let Some(call) = part.get("functionCall") {
                let name = call.get("name").and_then(Value::as_str).unwrap_or("").to_string();
                let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
                function_calls.push(FunctionCallRecord {
                    name,
                    args,
                    call_id: None,
                });
            }
        }

        Ok(InvokeOutcome {
            text,
            function_calls,
            assistant_payload: content,
        })
    }

    fn append_tool_results(&self, history: &mut Vec<Value>, results: &[(FunctionCallRecord, String)]) {
        let parts: Vec<Value> = results
            .iter()
            .map(|(fc, result)| {
                json!({
                    "functionResponse": {
                        "name": fc.name,
                        "response": { "result": result },
                    }
                })
            })
            .collect();
        history.push(json!({ "role": "tool", "parts": parts }));
    }

    fn append_assistant_text(&self, history: &mut Vec<Value>, text: &str) {
        history.push(json!({
            "role": "assistant",
            "parts": [{ "text": text }],
        }));
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
