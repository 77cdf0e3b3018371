use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall time as Unix seconds, used for event and turn timestamps.
pub fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A turn submitted by a client, queued for serial execution by the
/// owning session's worker.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub turn_id: u64,
    pub user_input: String,
    pub created_at: f64,
}

impl TurnRequest {
    pub fn new(turn_id: u64, user_input: String) -> Self {
        Self {
            turn_id,
            user_input,
            created_at: now_unix(),
        }
    }
}

/// Outcome reported by a `turn_finished` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Failed,
}

/// The closed set of event payloads a session can emit. Adjacently
/// tagged so the wire form is `{"type": "...", "payload": {...}}`,
/// matching the event table clients are written against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    SessionCreated {
        provider: String,
        model_id: String,
    },
    TurnEnqueued {
        queue_size: usize,
    },
    TurnStarted {
        input: String,
    },
    User {
        text: String,
    },
    ToolCall {
        index: u32,
        name: String,
        args: Value,
    },
    ToolDeduplicated {
        name: String,
        args: Value,
    },
    ToolResult {
        name: String,
        preview: String,
    },
    RateLimitRetry {
        attempt: u32,
        delay_seconds: f64,
    },
    RateLimitFailed {
        max_retries: u32,
    },
    Warning {
        message: String,
    },
    Answer {
        text: String,
    },
    Error {
        message: String,
    },
    TurnFinished {
        status: TurnStatus,
    },
    SessionCleared {
        dropped_pending: usize,
    },
    CancelRequested {
        running: bool,
        dropped_pending: usize,
        hard_cancel_supported: bool,
    },
}

/// An immutable, ordered record appended to a session's event buffer.
///
/// `event_id` is strictly increasing and dense within a session —
/// assigned only while holding the session lock (see `ra_sessions::Session`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub event_id: u64,
    pub session_id: String,
    pub turn_id: Option<u64>,
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: f64,
}

impl AgentEvent {
    pub fn new(event_id: u64, session_id: String, turn_id: Option<u64>, kind: EventKind) -> Self {
        Self {
            event_id,
            session_id,
            turn_id,
            kind,
            timestamp: now_unix(),
        }
    }

    /// Truncate a tool-result string to a 200-char preview, appending an
    /// ellipsis when truncated. Operates on chars, not bytes, so it never
    /// splits a multi-byte UTF-8 sequence.
    pub fn preview(text: &str, max_chars: usize) -> String {
        let mut chars = text.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_serializes_with_nested_payload() {
        let event = AgentEvent::new(
            1,
            "s1".into(),
            Some(3),
            EventKind::ToolCall {
                index: 1,
                name: "search_files".into(),
                args: json!({"query": "foo"}),
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["payload"]["name"], "search_files");
        assert_eq!(value["turn_id"], 3);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(250);
        let preview = AgentEvent::preview(&long, 200);
        assert_eq!(preview.chars().count(), 203); // 200 chars + "..."
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn preview_leaves_short_text_untouched() {
        assert_eq!(AgentEvent::preview("hi", 200), "hi");
    }
}
