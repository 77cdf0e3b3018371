use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool declaration advertised to the model, translated per provider
/// dialect by the adapter that owns a given session (see [`crate::config::Provider`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object for the tool's parameters.
    pub parameters: Value,
}

/// Normalized form of a single model-requested tool invocation.
///
/// `call_id` is populated for OpenAI-style dialects (the id the provider
/// must see echoed back in the corresponding `tool` message) and left
/// `None` for Google-style dialects, which key tool responses by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallRecord {
    pub name: String,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl FunctionCallRecord {
    /// Canonical signature used for consecutive-duplicate detection:
    /// `name|canonical_json(args)` with object keys sorted and no
    /// incidental whitespace.
    pub fn signature(&self) -> String {
        format!("{}|{}", self.name, canonical_json(&self.args))
    }
}

/// Render a JSON value with object keys sorted and no extraneous
/// whitespace, so that structurally-identical argument objects always
/// produce byte-identical signatures regardless of key order.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = String::from("{");
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                out.push_str(&canonical_json(&map[*key]));
            }
            out.push('}');
            out
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// A single provider-native conversation message.
///
/// Session history is kept opaque and provider-native ([§3][crate] of the
/// design): a Google-style turn stores `Content{role, parts}`, an
/// OpenAI-style turn stores `{role, content, tool_calls?}`. Both shapes
/// carry a top-level `role` string, which is all the loop needs to know
/// to decide whether a trailing message must be rolled back on error.
pub fn history_role(message: &Value) -> &str {
    message.get("role").and_then(Value::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys() {
        let a = canonical_json(&json!({"b": 1, "a": 2}));
        let b = canonical_json(&json!({"a": 2, "b": 1}));
        assert_eq!(a, b);
        assert_eq!(a, r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn signature_is_stable_across_key_order() {
        let f1 = FunctionCallRecord {
            name: "search_files".into(),
            args: json!({"query": "foo", "limit": 1}),
            call_id: None,
        };
        let f2 = FunctionCallRecord {
            name: "search_files".into(),
            args: json!({"limit": 1, "query": "foo"}),
            call_id: Some("call_1".into()),
        };
        assert_eq!(f1.signature(), f2.signature());
    }

    #[test]
    fn history_role_reads_top_level_field() {
        let msg = json!({"role": "user", "content": "hi"});
        assert_eq!(history_role(&msg), "user");
        assert_eq!(history_role(&json!({})), "");
    }
}
