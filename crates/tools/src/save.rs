//! File-save post-process tool.
//!
//! Runs after the agent's final answer and writes it into the workspace
//! under `outputs/`, named from the agent and a timestamp. Takes no
//! LLM-provided arguments; everything comes from the [`AgentView`].

use crate::{AgentView, Tool, ToolOutcome, ToolStage};
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs;

pub struct FileSaveTool {
    workspace_root: PathBuf,
}

impl FileSaveTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait::async_trait]
impl Tool for FileSaveTool {
    fn name(&self) -> &str {
        "file_save"
    }

    fn description(&self) -> &str {
        "Save the agent's final answer to a file in the workspace outputs directory."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    fn stage(&self) -> ToolStage {
        ToolStage::PostProcess
    }

    async fn execute(&self, _args: Value, view: &AgentView) -> ToolOutcome {
        if view.final_answer.is_empty() {
            return ToolOutcome::fail("no final answer to save");
        }

        let dir = self.workspace_root.join("outputs");
        if let Err(e) = fs::create_dir_all(&dir).await {
            return ToolOutcome::fail(format!("cannot create outputs directory: {e}"));
        }

        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let agent = sanitize_name(&view.agent_name);
        let path = dir.join(format!("{agent}-{stamp}.md"));

        match fs::write(&path, view.final_answer.as_bytes()).await {
            Ok(()) => ToolOutcome::ok(serde_json::json!({
                "path": path.display().to_string(),
                "bytes_written": view.final_answer.len(),
            })),
            Err(e) => ToolOutcome::fail(format!("cannot save answer: {e}")),
        }
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "agent".into()
    } else {
        cleaned
    }
}
