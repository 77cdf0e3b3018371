//! Read-only repository inspection tools: `search_files`, `read_file`, and
//! `list_dir`, each constrained to a single workspace root.
//!
//! Every path argument is resolved relative to the root and checked for
//! containment after canonicalization; nothing here can read or list outside
//! of it.

use regex::escape;
use regex::RegexBuilder;
use std::fs;
use std::path::{Path, PathBuf};

const SKIP_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    "node_modules",
    ".venv",
    "venv",
    "env",
    ".tox",
    ".eggs",
    "dist",
    "build",
    ".idea",
    ".vscode",
];

const SKIP_EXTENSIONS: &[&str] = &[
    "pyc", "pyo", "so", "dll", "exe", "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "zip",
    "tar", "gz", "bz2", "7z", "rar", "pdf", "doc", "docx", "xls", "xlsx", "mp3", "mp4", "avi",
    "mov", "woff", "woff2", "ttf", "eot", "db", "sqlite", "sqlite3",
];

const MAX_FILE_SIZE: u64 = 1024 * 1024;
const MAX_SEARCH_RESULTS: usize = 30;
const MAX_LINE_RANGE: i64 = 200;
const DEFAULT_END_LINE: i64 = 120;
const MAX_DIR_DEPTH: u32 = 2;

fn should_skip_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name) || name.starts_with('.')
}

fn is_text_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    if let Some(ext) = ext {
        if SKIP_EXTENSIONS.contains(&ext.as_str()) {
            return false;
        }
    }
    match fs::metadata(path) {
        Ok(meta) => meta.len() <= MAX_FILE_SIZE,
        Err(_) => false,
    }
}

/// Resolve `requested` relative to `root`, rejecting anything that escapes
/// it once canonicalized. Returns `None` for unsafe or unresolvable paths.
pub fn safe_resolve(root: &Path, requested: &str) -> Option<PathBuf> {
    let canonical_root = root.canonicalize().ok()?;
    let candidate = canonical_root.join(requested);
    let resolved = if candidate.exists() {
        candidate.canonicalize().ok()?
    } else {
        // Canonicalize the nearest existing ancestor and reattach the
        // remaining (not-yet-existing) components, matching Python's
        // `Path.resolve()` behavior on paths that don't exist yet.
        let mut existing = candidate.as_path();
        let mut tail = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            tail.push(existing.file_name()?.to_owned());
            existing = existing.parent()?;
        }
        let mut resolved = existing.canonicalize().ok()?;
        for part in tail.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };
    if resolved.starts_with(&canonical_root) {
        Some(resolved)
    } else {
        None
    }
}

/// Recursively search text files under `root` for `query`, case-insensitive,
/// returning up to 30 `path:line: content` matches.
pub fn search_files(root: &Path, query: &str) -> String {
    let pattern = match RegexBuilder::new(&escape(query)).case_insensitive(true).build() {
        Ok(p) => p,
        Err(_) => return format!("搜索模式无效：{query}"),
    };

    let mut results = Vec::new();
    let mut files_scanned = 0u64;
    walk_search(root, root, &pattern, &mut results, &mut files_scanned);

    if results.is_empty() {
        format!("未找到包含 \"{query}\" 的文件（已扫描 {files_scanned} 个文件）。")
    } else {
        let header = format!("找到 {} 条匹配（已扫描 {files_scanned} 个文件）：\n", results.len());
        header + &results.join("\n")
    }
}

fn walk_search(
    root: &Path,
    dir: &Path,
    pattern: &regex::Regex,
    results: &mut Vec<String>,
    files_scanned: &mut u64,
) {
    if results.len() >= MAX_SEARCH_RESULTS {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else { return };
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if !should_skip_dir(name) {
                    dirs.push(path);
                }
            }
        } else {
            files.push(path);
        }
    }

    for filepath in files {
        if results.len() >= MAX_SEARCH_RESULTS {
            return;
        }
        if !is_text_file(&filepath) {
            continue;
        }
        *files_scanned += 1;
        let Ok(content) = fs::read_to_string(&filepath) else { continue };
        let rel = filepath.strip_prefix(root).unwrap_or(&filepath);
        for (line_num, line) in content.lines().enumerate() {
            if pattern.is_match(line) {
                let mut snippet = line.trim_end().to_string();
                if snippet.chars().count() > 200 {
                    let truncated: String = snippet.chars().take(200).collect();
                    snippet = format!("{truncated}...");
                }
                results.push(format!("  {}:{}: {snippet}", rel.display(), line_num + 1));
                if results.len() >= MAX_SEARCH_RESULTS {
                    return;
                }
            }
        }
    }

    for subdir in dirs {
        walk_search(root, &subdir, pattern, results, files_scanned);
        if results.len() >= MAX_SEARCH_RESULTS {
            return;
        }
    }
}

/// Read `path`'s lines `[start_line, end_line]` (1-indexed, inclusive),
/// clamped to a 200-line window, prefixed with line numbers.
pub fn read_file(root: &Path, path: &str, start_line: Option<i64>, end_line: Option<i64>) -> String {
    let Some(filepath) = safe_resolve(root, path) else {
        return format!("错误：路径不安全或不在项目目录内：{path}");
    };
    if !filepath.exists() {
        return format!("错误：文件不存在：{path}");
    }
    if !filepath.is_file() {
        return format!("错误：路径不是文件：{path}");
    }
    if !is_text_file(&filepath) {
        return format!("错误：文件不是文本文件或体积过大：{path}");
    }

    let start = start_line.unwrap_or(1).max(1);
    let mut end = end_line.unwrap_or(DEFAULT_END_LINE).max(start);
    if end - start > MAX_LINE_RANGE {
        end = start + MAX_LINE_RANGE;
    }

    let content = match fs::read_to_string(&filepath) {
        Ok(c) => c,
        Err(e) => return format!("错误：无法读取文件 {path}：{e}"),
    };
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len() as i64;
    if start > total_lines {
        return format!("错误：起始行 {start} 超出文件总行数 {total_lines}。");
    }

    let start_idx = (start - 1) as usize;
    let end_idx = end.min(total_lines) as usize;
    let mut output = Vec::new();
    for (offset, line) in lines[start_idx..end_idx].iter().enumerate() {
        let line_no = start + offset as i64;
        output.push(format!("  {line_no:>4} | {}", line.trim_end()));
    }

    let header = format!(
        "文件：{path}（第 {start}-{} 行，共 {total_lines} 行）\n",
        end.min(total_lines)
    );
    header + &output.join("\n")
}

/// Render a depth-2 tree of `path`'s contents, directories first, hidden
/// and build-artifact directories pruned.
pub fn list_dir(root: &Path, path: &str) -> String {
    let Some(dirpath) = safe_resolve(root, path) else {
        return format!("错误：路径不安全或不在项目目录内：{path}");
    };
    if !dirpath.exists() {
        return format!("错误：目录不存在：{path}");
    }
    if !dirpath.is_dir() {
        return format!("错误：路径不是目录：{path}");
    }

    let mut output = Vec::new();
    let rel_display = if dirpath == root.canonicalize().unwrap_or_else(|_| root.to_path_buf()) {
        ".".to_string()
    } else {
        dirpath
            .strip_prefix(root.canonicalize().unwrap_or_else(|_| root.to_path_buf()))
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.to_string())
    };
    output.push(format!("{rel_display}/"));
    walk_tree(&dirpath, "", 1, &mut output);

    if output.len() == 1 {
        format!("目录 {path} 为空。")
    } else {
        output.join("\n")
    }
}

fn walk_tree(dir: &Path, prefix: &str, depth: u32, output: &mut Vec<String>) {
    if depth > MAX_DIR_DEPTH {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else { return };
    let mut items: Vec<(PathBuf, bool)> = entries
        .flatten()
        .filter_map(|e| {
            let path = e.path();
            let is_dir = path.is_dir();
            if is_dir {
                let name = path.file_name()?.to_str()?.to_string();
                if should_skip_dir(&name) {
                    return None;
                }
            }
            Some((path, is_dir))
        })
        .collect();
    // Directories first, then files, each group alphabetical — matches the
    // original's `(is_file, name)` sort key.
    items.sort_by(|a, b| match (a.1, b.1) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.0.file_name().cmp(&b.0.file_name()),
    });

    let count = items.len();
    for (i, (path, is_dir)) in items.into_iter().enumerate() {
        let is_last = i == count - 1;
        let connector = if is_last { "└── " } else { "├── " };
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("?");
        if is_dir {
            output.push(format!("{prefix}{connector}{name}/"));
            let extension = if is_last { "    " } else { "│   " };
            walk_tree(&path, &format!("{prefix}{extension}"), depth + 1, output);
        } else {
            output.push(format!("{prefix}{connector}{name}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {\n    println!(\"hello\");\n}\n").unwrap();
        fs::write(dir.path().join("README.md"), "# Project\nSome docs\n").unwrap();
        dir
    }

    #[test]
    fn search_files_finds_match_with_line_number() {
        let dir = setup();
        let result = search_files(dir.path(), "println");
        assert!(result.contains("src/main.rs:2:"));
    }

    #[test]
    fn search_files_reports_scan_count_on_miss() {
        let dir = setup();
        let result = search_files(dir.path(), "nonexistent_token_xyz");
        assert!(result.starts_with("未找到"));
    }

    #[test]
    fn read_file_applies_default_window() {
        let dir = setup();
        let result = read_file(dir.path(), "src/main.rs", None, None);
        assert!(result.contains("第 1-3 行，共 3 行"));
        assert!(result.contains("println"));
    }

    #[test]
    fn read_file_rejects_path_escape() {
        let dir = setup();
        let result = read_file(dir.path(), "../../etc/passwd", None, None);
        assert!(result.starts_with("错误：路径不安全"));
    }

    #[test]
    fn read_file_clamps_oversized_range() {
        let dir = setup();
        let result = read_file(dir.path(), "src/main.rs", Some(1), Some(10_000));
        assert!(result.contains("第 1-3 行"));
    }

    #[test]
    fn list_dir_lists_root_entries() {
        let dir = setup();
        let result = list_dir(dir.path(), ".");
        assert!(result.contains("README.md"));
        assert!(result.contains("src/"));
    }

    #[test]
    fn list_dir_rejects_missing_path() {
        let dir = setup();
        let result = list_dir(dir.path(), "does/not/exist");
        assert!(result.starts_with("错误：目录不存在"));
    }
}
