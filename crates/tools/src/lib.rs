//! Built-in tools for TaskMesh agents.
//!
//! A tool is a named capability the model can invoke during a turn
//! (pre-process stage) or that runs automatically after the final answer
//! (post-process stage). Tool failures are values, not panics or `Err`s:
//! `execute` always returns a [`ToolOutcome`] so the agent can react to
//! the failure in its next turn.

pub mod bash;
pub mod files;
pub mod registry;
pub mod save;
pub mod time;

pub use registry::ToolRegistry;

use serde::Serialize;
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool capability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// When a tool runs relative to the agent's reason/act loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStage {
    /// Callable by the LLM through tool-calls during the loop.
    PreProcess,
    /// Runs automatically, in registration order, after the final answer.
    PostProcess,
}

/// Read-only view of the invoking agent, handed to tools instead of a
/// back-pointer. Post-process tools draw their input from here.
#[derive(Debug, Clone, Default)]
pub struct AgentView {
    pub agent_name: String,
    pub subtask: String,
    /// Set only for the post-process phase.
    pub final_answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// The value a tool execution produces. Failures are carried in-band.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub output: Value,
}

impl ToolOutcome {
    pub fn ok(output: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            output,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            output: Value::String(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }
}

/// Trait that every tool must implement.
///
/// `execute` must not fail: anything that goes wrong becomes a
/// [`ToolOutcome`] with `status = Error`. Pre-process tools read `args`
/// (validated against [`Tool::parameters`] by the model, not by us);
/// post-process tools receive empty args and read the [`AgentView`].
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the tool's parameters.
    fn parameters(&self) -> Value;
    fn stage(&self) -> ToolStage {
        ToolStage::PreProcess
    }
    async fn execute(&self, args: Value, view: &AgentView) -> ToolOutcome;
}
