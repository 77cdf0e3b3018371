//! Read-only repository tools exposed to the model: `search_files`,
//! `read_file`, and `list_dir`, plus the registry that ties their JSON
//! Schema declarations to their dispatch names.

pub mod repo;

use ra_domain::ToolDefinition;
use serde_json::{json, Value};
use std::path::Path;

/// The tool declarations advertised to the model, in a provider-neutral
/// shape each dialect adapter translates on its own.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "search_files".into(),
            description: "在当前代码仓库中递归搜索包含指定文本的文件。\
                返回匹配的文件路径、行号和内容片段。\
                适合用于查找函数定义、类定义、特定字符串、import 语句等。"
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "要搜索的文本关键词，例如函数名、类名、变量名或任意字符串",
                    },
                },
                "required": ["query"],
            }),
        },
        ToolDefinition {
            name: "read_file".into(),
            description: "读取指定文件的内容片段。\
                需要提供文件的相对路径（相对于项目根目录）以及可选的起止行号。\
                用于查看文件具体内容、理解代码逻辑。"
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "文件的相对路径，例如 'src/main.rs' 或 'README.md'",
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "起始行号（从 1 开始，默认 1）",
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "结束行号（包含该行，默认 120）",
                    },
                },
                "required": ["path"],
            }),
        },
        ToolDefinition {
            name: "list_dir".into(),
            description: "列出指定目录的文件和子目录结构（最深 2 层）。用于了解项目结构、发现文件。".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "要列出的目录的相对路径，默认为项目根目录 '.'",
                    },
                },
                "required": [],
            }),
        },
    ]
}

/// Execute a tool call by name against `root`, returning the exact string
/// that gets appended to history as the tool result.
///
/// Never returns `Err`: an unknown tool name or malformed arguments are
/// reported in the returned string itself, matching the individual tool
/// functions' own error-string convention.
pub fn execute(root: &Path, name: &str, args: &Value) -> String {
    match name {
        "search_files" => match args.get("query").and_then(Value::as_str) {
            Some(query) => repo::search_files(root, query),
            None => "工具执行出错：ArgumentError: missing required argument 'query'".into(),
        },
        "read_file" => match args.get("path").and_then(Value::as_str) {
            Some(path) => {
                let start_line = args.get("start_line").and_then(Value::as_i64);
                let end_line = args.get("end_line").and_then(Value::as_i64);
                repo::read_file(root, path, start_line, end_line)
            }
            None => "工具执行出错：ArgumentError: missing required argument 'path'".into(),
        },
        "list_dir" => {
            let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
            repo::list_dir(root, path)
        }
        other => format!("错误：未知的工具函数 '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definitions_cover_the_three_repo_tools() {
        let names: Vec<&str> = tool_definitions().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["search_files", "read_file", "list_dir"]);
    }

    #[test]
    fn execute_reports_unknown_tool_name() {
        let dir = tempfile::tempdir().unwrap();
        let result = execute(dir.path(), "delete_everything", &json!({}));
        assert_eq!(result, "错误：未知的工具函数 'delete_everything'");
    }

    #[test]
    fn execute_reports_missing_required_argument() {
        let dir = tempfile::tempdir().unwrap();
        let result = execute(dir.path(), "search_files", &json!({}));
        assert!(result.starts_with("工具执行出错"));
    }

    #[test]
    fn execute_list_dir_defaults_path_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = execute(dir.path(), "list_dir", &json!({}));
        assert!(!result.starts_with("错误"));
    }
}
