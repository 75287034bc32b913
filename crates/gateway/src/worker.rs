//! Task worker — binds a client connection to a team run.
//!
//! One worker per submitted task: create the task row, subscribe the
//! connection, ack the submission, then run the orchestrator on a
//! spawned task, translating engine events into client frames. The
//! worker owns the task row's status for its whole life.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tm_domain::task::{TaskRecord, TaskStatus};
use tm_engine::ExecEvent;

use crate::bootstrap;
use crate::bus::Frame;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker tracking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tracks spawned task workers so shutdown can wait for them.
#[derive(Default)]
pub struct WorkerTracker {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn active_count(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait up to `timeout` for in-flight workers, then abort the rest.
    pub async fn drain(&self, timeout: Duration) {
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return;
        }
        tracing::info!(workers = handles.len(), "waiting for task workers to drain");

        let deadline = tokio::time::Instant::now() + timeout;
        for handle in handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(_) => {}
                Err(_) => tracing::warn!("task worker did not finish within drain timeout"),
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event translation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Turns engine events into client frames for one task.
///
/// The engine's granular events pass through verbatim; tool start/end
/// additionally produce the client-view `tool_decision` / `tool_execute`
/// frames. The current agent is tracked from the latest decision.
pub(crate) struct EventTranslator {
    task_id: String,
    current_agent: String,
}

impl EventTranslator {
    pub(crate) fn new(task_id: String) -> Self {
        Self {
            task_id,
            current_agent: String::new(),
        }
    }

    fn frame(&self, event: &str, data: Value) -> Frame {
        Frame::new(event, Some(self.task_id.clone()), data)
    }

    pub(crate) fn translate(&mut self, event: ExecEvent) -> Vec<Frame> {
        let task_id = self.task_id.clone();
        match event {
            ExecEvent::TurnStart { turn } => vec![self.frame(
                "turn_start",
                json!({ "task_id": task_id, "agent_id": self.current_agent, "turn": turn }),
            )],

            ExecEvent::MessageUpdate { delta } => vec![self.frame(
                "message_update",
                json!({ "task_id": task_id, "agent_id": self.current_agent, "delta": delta }),
            )],

            ExecEvent::AgentThinking { agent_name, thought } => vec![self.frame(
                "agent_thinking",
                json!({ "task_id": task_id, "agent_id": agent_name, "thought": thought }),
            )],

            ExecEvent::ToolExecutionStart {
                call_id,
                tool_name,
                arguments,
                thought,
            } => vec![
                self.frame(
                    "tool_execution_start",
                    json!({
                        "task_id": task_id,
                        "agent_id": self.current_agent,
                        "call_id": call_id,
                        "tool_name": tool_name,
                        "arguments": arguments,
                    }),
                ),
                self.frame(
                    "tool_decision",
                    json!({
                        "task_id": task_id,
                        "agent_id": self.current_agent,
                        "tool_id": tool_name,
                        "tool_name": tool_name,
                        "thought": thought,
                        "parameters": arguments,
                    }),
                ),
            ],

            ExecEvent::ToolExecutionEnd {
                call_id,
                tool_name,
                status,
                result,
                execution_time,
            } => vec![
                self.frame(
                    "tool_execution_end",
                    json!({
                        "task_id": task_id,
                        "agent_id": self.current_agent,
                        "call_id": call_id,
                        "tool_name": tool_name,
                        "status": status,
                        "result": result,
                        "execution_time": execution_time,
                    }),
                ),
                self.frame(
                    "tool_execute",
                    json!({
                        "task_id": task_id,
                        "agent_id": self.current_agent,
                        "tool_id": tool_name,
                        "tool_name": tool_name,
                        "status": status,
                        "execution_time": execution_time,
                        "tool_result": result,
                    }),
                ),
            ],

            ExecEvent::AgentDecision { agent_name, subtask } => {
                self.current_agent = agent_name.clone();
                vec![self.frame(
                    "agent_decision",
                    json!({
                        "task_id": task_id,
                        "agent_id": agent_name,
                        "agent_name": agent_name,
                        "agent_avatar": "",
                        "sub_task": subtask,
                    }),
                )]
            }

            ExecEvent::AgentResult { agent_name, result } => vec![self.frame(
                "agent_result",
                json!({ "task_id": task_id, "agent_id": agent_name, "result": result }),
            )],

            ExecEvent::Error { message } => vec![self.frame(
                "error",
                json!({ "task_id": task_id, "error": message }),
            )],
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// User input handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle one `user_input` message from a connection.
///
/// Empty input is dropped without creating a task or sending any frame.
/// Configuration problems (unknown team/model/tool) are reported as a
/// failed submission and leave no task row behind.
pub async fn handle_user_input(state: AppState, conn_id: &str, data: &Value) {
    let text = data.get("text").and_then(|v| v.as_str()).unwrap_or("");
    let team_name = data
        .get("team")
        .and_then(|v| v.as_str())
        .unwrap_or("general_team");

    if text.is_empty() {
        tracing::debug!(conn_id, "empty user input ignored");
        return;
    }
    if state.shutdown.load(std::sync::atomic::Ordering::Relaxed) {
        tracing::info!(conn_id, "shutdown in progress; rejecting new task");
        return;
    }

    // Resolve the team before any side effect: a bad config must not
    // leave a task row behind.
    let team = match bootstrap::build_team(&state, team_name) {
        Ok(team) => team,
        Err(e) => {
            tracing::warn!(conn_id, team = team_name, error = %e, "task rejected");
            state.bus.send_to(
                conn_id,
                &Frame::new(
                    "user_task_submit",
                    None,
                    json!({ "status": "failed", "msg": e.to_string() }),
                ),
            );
            return;
        }
    };

    let task_id = uuid::Uuid::new_v4().to_string();
    let record = TaskRecord::new(task_id.clone(), text);
    if let Err(e) = state.store.create(&record) {
        tracing::error!(task_id, error = %e, "failed to create task row");
        state.bus.send_to(
            conn_id,
            &Frame::new(
                "user_task_submit",
                None,
                json!({ "status": "failed", "msg": "failed to create task" }),
            ),
        );
        return;
    }

    state.bus.subscribe(conn_id, &task_id);
    state.bus.send_to(
        conn_id,
        &Frame::new(
            "user_task_submit",
            Some(task_id.clone()),
            json!({
                "status": "success",
                "task_id": task_id,
                "msg": "Task submitted successfully",
            }),
        ),
    );

    tracing::info!(task_id, team = team_name, "task worker starting");
    let content = text.to_string();
    let worker_state = state.clone();
    let handle = tokio::spawn(async move {
        run_task(worker_state, team, task_id, content).await;
    });
    state.workers.track(handle);
}

/// Run the orchestrator to completion, forwarding events as frames, and
/// settle the task row's final status.
async fn run_task(state: AppState, mut team: tm_engine::Team, task_id: String, content: String) {
    let (tx, mut rx) = mpsc::channel::<ExecEvent>(256);
    let shutdown = state.shutdown.clone();
    let bus = state.bus.clone();

    let run = async {
        let result = team.run(&content, &shutdown, &tx).await;
        drop(tx);
        result
    };

    let forward_task_id = task_id.clone();
    let forward_bus = Arc::clone(&bus);
    let forward = async move {
        let mut translator = EventTranslator::new(forward_task_id.clone());
        while let Some(event) = rx.recv().await {
            for frame in translator.translate(event) {
                forward_bus.publish(&forward_task_id, &frame);
            }
        }
    };

    let (result, ()) = tokio::join!(run, forward);

    let status = match &result {
        Ok(outputs) => {
            tracing::info!(task_id, agents = outputs.len(), "task completed");
            TaskStatus::Success
        }
        Err(e) => {
            tracing::error!(task_id, error = %e, "task failed");
            TaskStatus::Failed
        }
    };

    bus.publish(
        &task_id,
        &Frame::new(
            "task_result",
            Some(task_id.clone()),
            json!({ "task_id": task_id, "status": status.as_str() }),
        ),
    );

    if let Err(e) = state.store.update_status(&task_id, status) {
        tracing::error!(task_id, error = %e, "failed to update task status");
    }
}
