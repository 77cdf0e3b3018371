//! The reasoning loop: one full user-input-to-answer turn, driving a
//! provider adapter through repeated model calls and tool dispatch.

use ra_domain::{AgentEvent, EventKind, FunctionCallRecord, Result, ToolDefinition};
use ra_providers::{ProviderAdapter, RetryNotice};
use std::collections::HashMap;
use std::path::Path;

/// Effective tool calls allowed per turn, excluding deduplicated reuses.
pub const MAX_TOOL_CALLS_PER_TURN: u32 = 15;
/// Raw model-issued tool calls allowed per turn, including duplicates —
/// a loop-protection ceiling independent of the effective-call budget.
pub const MAX_RAW_TOOL_CALLS_PER_TURN: u32 = 60;

const PREVIEW_CHARS: usize = 200;

/// Execute one turn: append the user's message, then alternate model calls
/// and tool dispatch until the model stops requesting tools or a call-count
/// safeguard trips. `emit` is invoked for every event the turn produces;
/// the caller is responsible for stamping `session_id`/`turn_id`/`event_id`.
pub async fn run_turn(
    adapter: &dyn ProviderAdapter,
    tools: &[ToolDefinition],
    workspace_root: &Path,
    history: &mut Vec<serde_json::Value>,
    user_input: &str,
    mut emit: impl FnMut(EventKind),
) -> Result<String> {
    adapter.append_user_message(history, user_input);

    let mut tool_call_count: u32 = 0;
    let mut raw_tool_call_count: u32 = 0;
    let mut tool_result_cache: HashMap<String, String> = HashMap::new();
    let mut last_signature: Option<String> = None;
    let mut tool_result_previews: Vec<String> = Vec::new();

    loop {
        let outcome = adapter
            .invoke(history, tools, &mut |notice| match notice {
                RetryNotice::Retrying { attempt, delay_seconds } => {
                    emit(EventKind::RateLimitRetry { attempt, delay_seconds })
                }
                RetryNotice::Exhausted { max_retries } => {
                    emit(EventKind::RateLimitFailed { max_retries })
                }
            })
            .await?;

        history.push(outcome.assistant_payload.clone());

        if outcome.function_calls.is_empty() {
            return Ok(if outcome.text.is_empty() {
                "(模型未返回文本内容)".to_string()
            } else {
                outcome.text
            });
        }

        let mut tool_results: Vec<(FunctionCallRecord, String)> = Vec::new();
        for fc in &outcome.function_calls {
            raw_tool_call_count += 1;
            let mut fc = fc.clone();
            if fc.call_id.is_none() {
                fc.call_id = Some(format!("call_{raw_tool_call_count}"));
            }

            emit(EventKind::ToolCall {
                index: raw_tool_call_count,
                name: fc.name.clone(),
                args: fc.args.clone(),
            });

            let signature = fc.signature();
            let is_consecutive_duplicate =
                last_signature.as_deref() == Some(signature.as_str()) && tool_result_cache.contains_key(&signature);

            let result = if is_consecutive_duplicate {
                emit(EventKind::ToolDeduplicated {
                    name: fc.name.clone(),
                    args: fc.args.clone(),
                });
                tool_result_cache.get(&signature).cloned().unwrap_or_default()
            } else {
                tool_call_count += 1;
                let result = ra_tools::execute(workspace_root, &fc.name, &fc.args);
                tool_result_cache.insert(signature.clone(), result.clone());
                result
            };

            let preview = AgentEvent::preview(&result, PREVIEW_CHARS);
            emit(EventKind::ToolResult {
                name: fc.name.clone(),
                preview: preview.clone(),
            });
            tool_result_previews.push(format!("{}: {preview}", fc.name));
            tool_results.push((fc.clone(), result));
            last_signature = Some(signature);
        }

        adapter.append_tool_results(history, &tool_results);

        if tool_call_count >= MAX_TOOL_CALLS_PER_TURN {
            emit(EventKind::Warning {
                message: format!("已达到单轮最大有效工具调用次数 ({MAX_TOOL_CALLS_PER_TURN})，强制结束。"),
            });
            let answer = build_tool_cap_answer(tool_call_count, last_n(&tool_result_previews, 5), None);
            adapter.append_assistant_text(history, &answer);
            return Ok(answer);
        }

        if raw_tool_call_count >= MAX_RAW_TOOL_CALLS_PER_TURN {
            emit(EventKind::Warning {
                message: format!(
                    "原始工具请求次数过多 ({raw_tool_call_count}/{MAX_RAW_TOOL_CALLS_PER_TURN})，疑似重复循环，强制结束。"
                ),
            });
            let answer = build_tool_cap_answer(
                tool_call_count,
                last_n(&tool_result_previews, 5),
                Some(raw_tool_call_count),
            );
            adapter.append_assistant_text(history, &answer);
            return Ok(answer);
        }
    }
}

fn last_n(items: &[String], n: usize) -> &[String] {
    let start = items.len().saturating_sub(n);
    &items[start..]
}

/// Build the local fallback answer returned when a call-count safeguard
/// trips, avoiding one more round-trip to the model.
fn build_tool_cap_answer(tool_call_count: u32, previews: &[String], raw: Option<u32>) -> String {
    let mut lines = Vec::new();
    if let Some(raw_count) = raw {
        lines.push(format!(
            "本轮检测到工具请求过多（原始请求 {raw_count}/{MAX_RAW_TOOL_CALLS_PER_TURN}），可能存在重复调用循环，已停止继续调用模型。"
        ));
    } else {
        lines.push(format!(
            "本轮已达到工具调用上限（有效调用 {tool_call_count}/{MAX_TOOL_CALLS_PER_TURN}），为降低请求次数已停止继续调用模型。"
        ));
    }
    if !previews.is_empty() {
        lines.push("已获取信息摘要：".to_string());
        lines.extend(previews.iter().map(|p| format!("- {p}")));
    }
    lines.push("如需更精确结果，请缩小提问范围后重试。".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_cap_answer_mentions_effective_count() {
        let answer = build_tool_cap_answer(15, &[], None);
        assert!(answer.contains("15/15"));
        assert!(answer.contains("为降低请求次数"));
    }

    #[test]
    fn raw_cap_answer_mentions_raw_count() {
        let answer = build_tool_cap_answer(3, &[], Some(60));
        assert!(answer.contains("60/60"));
        assert!(answer.contains("重复调用循环"));
    }

    #[test]
    fn last_n_handles_short_slices() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(last_n(&items, 5), &items[..]);
    }
}
