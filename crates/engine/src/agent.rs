//! Agent state: identity, model binding, tool set, conversation history,
//! and the actions captured while a run is in flight.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tm_domain::message::Message;
use tm_providers::LlmProvider;
use tm_tools::{AgentView, Tool, ToolStage};

/// What kind of action an agent took within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ToolUse,
    Thought,
    Message,
}

/// Record of one tool execution, kept for event translation and audit.
#[derive(Debug, Clone, Serialize)]
pub struct ToolRecord {
    pub tool_name: String,
    pub input_params: Value,
    pub output: Value,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub execution_time_s: f64,
}

/// One captured action. Append-only within a turn.
#[derive(Debug, Clone, Serialize)]
pub struct AgentAction {
    pub agent_name: String,
    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolRecord>,
}

/// A named LLM persona with its own system prompt, model, and tool set.
///
/// Owned by exactly one team for a given run. History is cleared at the
/// start of each orchestrator-driven turn, so an agent can be reused
/// across runs without leaking state.
pub struct Agent {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub model: Arc<dyn LlmProvider>,
    /// Concrete model name sent with requests and used for the context
    /// window lookup.
    pub model_name: String,
    pub tools: Vec<Arc<dyn Tool>>,
    /// Cap on reason/act turns for a single subtask.
    pub max_steps: u32,
    /// Conversation history for the current subtask.
    pub messages: Vec<Message>,
    /// Actions captured during the current run.
    pub captured_actions: Vec<AgentAction>,
}

impl Agent {
    /// Clear conversation history and captured actions.
    pub fn clear_history(&mut self) {
        self.messages.clear();
        self.captured_actions.clear();
    }

    /// Tools the LLM may invoke during the loop.
    pub fn pre_process_tools(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools
            .iter()
            .filter(|t| t.stage() == ToolStage::PreProcess)
    }

    /// Tools that run automatically after the final answer, in
    /// registration order.
    pub fn post_process_tools(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools
            .iter()
            .filter(|t| t.stage() == ToolStage::PostProcess)
    }

    /// Find a pre-process tool by name. Post-process tools are invisible
    /// to tool-calls.
    pub fn find_pre_process_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        match self.tools.iter().find(|t| t.name() == name) {
            Some(tool) if tool.stage() == ToolStage::PreProcess => Some(tool.clone()),
            Some(_) => {
                tracing::warn!(
                    tool = name,
                    agent = %self.name,
                    "post-process tool cannot be called directly"
                );
                None
            }
            None => None,
        }
    }

    /// The read-only view handed to tools.
    pub fn view(&self, subtask: &str, final_answer: &str) -> AgentView {
        AgentView {
            agent_name: self.name.clone(),
            subtask: subtask.to_string(),
            final_answer: final_answer.to_string(),
        }
    }

    pub fn capture_tool_use(
        &mut self,
        tool_name: &str,
        input_params: Value,
        output: Value,
        is_error: bool,
        thought: Option<String>,
        execution_time_s: f64,
    ) {
        let record = ToolRecord {
            tool_name: tool_name.to_string(),
            input_params,
            error_message: if is_error {
                Some(output.as_str().map(String::from).unwrap_or_else(|| output.to_string()))
            } else {
                None
            },
            output,
            status: if is_error { "error".into() } else { "success".into() },
            execution_time_s,
        };
        self.captured_actions.push(AgentAction {
            agent_name: self.name.clone(),
            action_type: ActionType::ToolUse,
            thought,
            tool_result: Some(record),
        });
    }

    pub fn capture_thought(&mut self, thought: &str) {
        self.captured_actions.push(AgentAction {
            agent_name: self.name.clone(),
            action_type: ActionType::Thought,
            thought: Some(thought.to_string()),
            tool_result: None,
        });
    }

    pub fn capture_message(&mut self, content: &str) {
        self.captured_actions.push(AgentAction {
            agent_name: self.name.clone(),
            action_type: ActionType::Message,
            thought: Some(content.to_string()),
            tool_result: None,
        });
    }
}
