use serde::Serialize;
use serde_json::Value;

/// Events emitted by the executor and orchestrator while a task runs.
///
/// Carried on an mpsc channel to the task worker, which translates them
/// into client-facing frames. Sends are fire-and-forget: a dropped
/// receiver must never abort a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecEvent {
    /// A new reason/act turn is starting.
    TurnStart { turn: u32 },

    /// Incremental assistant text from the model stream.
    MessageUpdate { delta: String },

    /// The text the agent produced alongside tool calls this turn.
    AgentThinking { agent_name: String, thought: String },

    /// A tool is about to run.
    ToolExecutionStart {
        call_id: String,
        tool_name: String,
        arguments: Value,
        /// The turn text that led to this call, if any.
        thought: String,
    },

    /// A tool finished (or was refused / failed).
    ToolExecutionEnd {
        call_id: String,
        tool_name: String,
        status: String,
        result: Value,
        /// Wall-clock execution time in seconds.
        execution_time: f64,
    },

    /// The orchestrator chose the next agent.
    AgentDecision { agent_name: String, subtask: String },

    /// An agent produced its final answer for its subtask.
    AgentResult { agent_name: String, result: String },

    /// A non-recoverable error surfaced during execution.
    Error { message: String },
}
