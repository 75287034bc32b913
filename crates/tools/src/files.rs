//! File tools — read and write confined to a workspace root.
//!
//! Paths must be relative and free of `..` components; the resolved
//! target must stay inside the workspace after canonicalization.

use crate::{AgentView, Tool, ToolOutcome};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate and resolve a requested path within a workspace root.
///
/// 1. Rejects absolute paths and raw `..` components in the input.
/// 2. Joins the requested path onto the workspace root.
/// 3. Canonicalizes the existing prefix and checks containment.
pub(crate) fn validate_path(workspace_root: &Path, requested: &str) -> Result<PathBuf, String> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(format!(
            "absolute paths are not allowed; use a path relative to the workspace root (got '{requested}')"
        ));
    }
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err("path must not contain '..' components".to_owned());
        }
    }

    let canonical_root = workspace_root.canonicalize().map_err(|e| {
        format!(
            "cannot resolve workspace root '{}': {e}",
            workspace_root.display()
        )
    })?;
    let candidate = canonical_root.join(requested_path);

    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| format!("cannot resolve path '{}': {e}", candidate.display()))?
    } else {
        candidate
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(format!(
            "path '{requested}' resolves outside the workspace root"
        ));
    }

    Ok(resolved)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// file_read
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct FileReadArgs {
    path: String,
    /// Line number to start from (0-indexed).
    #[serde(default)]
    offset: Option<usize>,
    /// Maximum number of lines to return.
    #[serde(default)]
    limit: Option<usize>,
}

pub struct FileReadTool {
    workspace_root: PathBuf,
}

impl FileReadTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait::async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace. Supports an optional line offset and limit."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Workspace-relative file path"},
                "offset": {"type": "integer", "description": "Line to start from (0-indexed)"},
                "limit": {"type": "integer", "description": "Maximum number of lines"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, _view: &AgentView) -> ToolOutcome {
        let args: FileReadArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::fail(format!("invalid file_read arguments: {e}")),
        };

        let path = match validate_path(&self.workspace_root, &args.path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::fail(e),
        };

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolOutcome::fail(format!("cannot read '{}': {e}", args.path)),
        };

        let total_lines = content.lines().count();
        let offset = args.offset.unwrap_or(0);
        let limit = args.limit.unwrap_or(usize::MAX);
        let window: String = content
            .lines()
            .skip(offset)
            .take(limit)
            .collect::<Vec<_>>()
            .join("\n");

        ToolOutcome::ok(serde_json::json!({
            "path": args.path,
            "content": window,
            "total_lines": total_lines,
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// file_write
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct FileWriteArgs {
    path: String,
    content: String,
}

pub struct FileWriteTool {
    workspace_root: PathBuf,
}

impl FileWriteTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait::async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace, creating parent directories as needed."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Workspace-relative file path"},
                "content": {"type": "string", "description": "Content to write"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, _view: &AgentView) -> ToolOutcome {
        let args: FileWriteArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::fail(format!("invalid file_write arguments: {e}")),
        };

        let path = match validate_path(&self.workspace_root, &args.path) {
            Ok(p) => p,
            Err(e) => return ToolOutcome::fail(e),
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolOutcome::fail(format!("cannot create directories: {e}"));
            }
        }

        match fs::write(&path, args.content.as_bytes()).await {
            Ok(()) => ToolOutcome::ok(serde_json::json!({
                "path": args.path,
                "bytes_written": args.content.len(),
            })),
            Err(e) => ToolOutcome::fail(format!("cannot write '{}': {e}", args.path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> AgentView {
        AgentView::default()
    }

    #[test]
    fn validate_rejects_escape_attempts() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_path(dir.path(), "../outside.txt").is_err());
        assert!(validate_path(dir.path(), "/etc/passwd").is_err());
        assert!(validate_path(dir.path(), "a/../../b").is_err());
        assert!(validate_path(dir.path(), "notes/today.md").is_ok());
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let write = FileWriteTool::new(dir.path().to_path_buf());
        let read = FileReadTool::new(dir.path().to_path_buf());

        let outcome = write
            .execute(
                serde_json::json!({"path": "notes/a.txt", "content": "one\ntwo\nthree"}),
                &view(),
            )
            .await;
        assert!(!outcome.is_error());

        let outcome = read
            .execute(
                serde_json::json!({"path": "notes/a.txt", "offset": 1, "limit": 1}),
                &view(),
            )
            .await;
        assert!(!outcome.is_error());
        assert_eq!(outcome.output["content"], "two");
        assert_eq!(outcome.output["total_lines"], 3);
    }

    #[tokio::test]
    async fn read_missing_file_is_an_error_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let read = FileReadTool::new(dir.path().to_path_buf());
        let outcome = read
            .execute(serde_json::json!({"path": "nope.txt"}), &view())
            .await;
        assert!(outcome.is_error());
    }
}
