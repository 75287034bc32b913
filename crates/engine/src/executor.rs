//! Agent stream executor — one agent's reason/act loop.
//!
//! Per turn: trim history, call the model with streaming, forward text
//! deltas, assemble tool calls from indexed fragments, dispatch them in
//! index order, append results to history, repeat until the model
//! answers without tool calls or a step budget runs out.

use std::collections::BTreeMap;
use std::time::Instant;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use tm_domain::error::{Error, Result};
use tm_domain::message::{Message, ToolCall};
use tm_domain::stream::{StreamChunk, Usage};
use tm_providers::ChatRequest;

use crate::agent::Agent;
use crate::events::ExecEvent;
use crate::trim;

/// The enclosing team's step budget, shared across every agent in a run.
pub struct TeamBudget<'a> {
    pub current: &'a mut u32,
    pub max: u32,
}

/// A tool call being assembled from streamed fragments, keyed by index.
#[derive(Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Run one agent's reason/act loop for `user_message` and return the
/// final answer text.
///
/// With `clear_history`, the agent starts from a fresh conversation
/// (system prompt + user message); otherwise the accumulated history is
/// extended. Events are sent best-effort on `tx`.
pub async fn run_stream(
    agent: &mut Agent,
    mut team: Option<TeamBudget<'_>>,
    user_message: &str,
    clear_history: bool,
    tx: &mpsc::Sender<ExecEvent>,
) -> Result<String> {
    if clear_history {
        agent.clear_history();
    }
    if agent.messages.is_empty() {
        agent.messages.push(Message::system(&agent.system_prompt));
    }
    agent.messages.push(Message::user(user_message));

    let tool_defs: Vec<_> = agent
        .pre_process_tools()
        .map(|t| tm_domain::message::ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters(),
        })
        .collect();

    let context_window = agent.model.context_window(&agent.model_name);
    let mut last_usage: Option<Usage> = None;

    let mut turn: u32 = 0;
    loop {
        turn += 1;
        // Step bounds are checked before the turn is announced, so a
        // budget of N produces exactly N turn_start events.
        if turn > agent.max_steps {
            return Err(step_limit("agent", agent.max_steps, tx).await);
        }
        if let Some(budget) = team.as_mut() {
            if *budget.current >= budget.max {
                return Err(step_limit("team", budget.max, tx).await);
            }
            *budget.current += 1;
        }
        let _ = tx.send(ExecEvent::TurnStart { turn }).await;

        trim::trim_history(&mut agent.messages, context_window, last_usage.as_ref());

        let req = ChatRequest {
            messages: agent.messages.clone(),
            tools: tool_defs.clone(),
            temperature: None,
            max_tokens: None,
            json_mode: false,
            model: Some(agent.model_name.clone()),
        };

        tracing::debug!(agent = %agent.name, turn, "model call");
        let mut stream = match agent.model.chat_stream(req).await {
            Ok(s) => s,
            Err(e) => {
                let _ = tx
                    .send(ExecEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return Err(e);
            }
        };

        // ── Consume the stream ────────────────────────────────────
        let mut text_buf = String::new();
        let mut pending: BTreeMap<u32, PendingCall> = BTreeMap::new();

        while let Some(item) = stream.next().await {
            let chunk = match item {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx
                        .send(ExecEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    return Err(e);
                }
            };
            match chunk {
                StreamChunk::Content { text } => {
                    let _ = tx
                        .send(ExecEvent::MessageUpdate { delta: text.clone() })
                        .await;
                    text_buf.push_str(&text);
                }
                StreamChunk::ToolCall {
                    index,
                    id,
                    name,
                    arguments_fragment,
                } => {
                    let entry = pending.entry(index).or_default();
                    if let Some(id) = id {
                        entry.id = id;
                    }
                    if let Some(name) = name {
                        entry.name = name;
                    }
                    if let Some(fragment) = arguments_fragment {
                        entry.arguments.push_str(&fragment);
                    }
                }
                StreamChunk::Finish { usage, .. } => {
                    if usage.is_some() {
                        last_usage = usage;
                    }
                    break;
                }
                StreamChunk::Error {
                    status_code,
                    message,
                } => {
                    let _ = tx
                        .send(ExecEvent::Error {
                            message: message.clone(),
                        })
                        .await;
                    return Err(Error::Provider {
                        status_code,
                        message,
                    });
                }
            }
        }

        // ── No tool calls: final answer ───────────────────────────
        if pending.is_empty() {
            agent.messages.push(Message::assistant(&text_buf));
            agent.capture_message(&text_buf);
            let _ = tx
                .send(ExecEvent::AgentResult {
                    agent_name: agent.name.clone(),
                    result: text_buf.clone(),
                })
                .await;
            run_post_process(agent, user_message, &text_buf, tx).await;
            return Ok(text_buf);
        }

        // ── Tool calls: dispatch in index order ───────────────────
        let calls: Vec<ToolCall> = pending
            .into_values()
            .map(|p| ToolCall {
                id: p.id,
                name: p.name,
                arguments: p.arguments,
            })
            .collect();

        let thought = text_buf.trim().to_string();
        if !thought.is_empty() {
            agent.capture_thought(&thought);
            let _ = tx
                .send(ExecEvent::AgentThinking {
                    agent_name: agent.name.clone(),
                    thought: thought.clone(),
                })
                .await;
        }

        agent
            .messages
            .push(Message::assistant_with_calls(&text_buf, &calls));

        for call in &calls {
            dispatch_tool_call(agent, call, user_message, &thought, tx).await;
        }
    }
}

/// Execute one tool call: parse arguments, resolve the tool, run it,
/// time it, capture the action, emit events, and append the tool
/// message to history.
async fn dispatch_tool_call(
    agent: &mut Agent,
    call: &ToolCall,
    subtask: &str,
    thought: &str,
    tx: &mpsc::Sender<ExecEvent>,
) {
    // Empty arguments mean "no parameters"; malformed arguments become
    // an error result without invoking the tool.
    let parsed_args: std::result::Result<Value, String> = if call.arguments.trim().is_empty() {
        Ok(Value::Object(Default::default()))
    } else {
        serde_json::from_str(&call.arguments)
            .map_err(|e| format!("malformed tool arguments: {e}"))
    };

    let event_args = parsed_args
        .as_ref()
        .cloned()
        .unwrap_or_else(|_| Value::String(call.arguments.clone()));

    let _ = tx
        .send(ExecEvent::ToolExecutionStart {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: event_args.clone(),
            thought: thought.to_string(),
        })
        .await;

    let started = Instant::now();
    let outcome = match &parsed_args {
        Err(msg) => {
            tracing::warn!(tool = %call.name, error = %msg, "tool arguments rejected");
            tm_tools::ToolOutcome::fail(msg.clone())
        }
        Ok(args) => match agent.find_pre_process_tool(&call.name) {
            Some(tool) => {
                let view = agent.view(subtask, "");
                tool.execute(args.clone(), &view).await
            }
            None => tm_tools::ToolOutcome::fail(format!("unknown tool '{}'", call.name)),
        },
    };
    let execution_time = started.elapsed().as_secs_f64();

    let is_error = outcome.is_error();
    let status = if is_error { "error" } else { "success" };

    agent.capture_tool_use(
        &call.name,
        event_args,
        outcome.output.clone(),
        is_error,
        if thought.is_empty() {
            None
        } else {
            Some(thought.to_string())
        },
        execution_time,
    );

    let _ = tx
        .send(ExecEvent::ToolExecutionEnd {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: status.to_string(),
            result: outcome.output.clone(),
            execution_time,
        })
        .await;

    let content = serde_json::to_string(&serde_json::json!({
        "status": status,
        "result": outcome.output,
    }))
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to serialize tool result");
        String::new()
    });
    agent.messages.push(Message::tool_result(&call.id, content));
}

/// Run all post-process tools against the final answer, in registration
/// order. Failures are logged and captured but never abort the run.
async fn run_post_process(
    agent: &mut Agent,
    subtask: &str,
    final_answer: &str,
    tx: &mpsc::Sender<ExecEvent>,
) {
    let tools: Vec<_> = agent.post_process_tools().cloned().collect();
    for tool in tools {
        let call_id = format!("post-{}", tool.name());
        let _ = tx
            .send(ExecEvent::ToolExecutionStart {
                call_id: call_id.clone(),
                tool_name: tool.name().to_string(),
                arguments: Value::Object(Default::default()),
                thought: String::new(),
            })
            .await;

        let started = Instant::now();
        let view = agent.view(subtask, final_answer);
        let outcome = tool
            .execute(Value::Object(Default::default()), &view)
            .await;
        let execution_time = started.elapsed().as_secs_f64();

        let is_error = outcome.is_error();
        if is_error {
            tracing::warn!(tool = tool.name(), "post-process tool failed");
        }
        agent.capture_tool_use(
            tool.name(),
            Value::Object(Default::default()),
            outcome.output.clone(),
            is_error,
            None,
            execution_time,
        );

        let _ = tx
            .send(ExecEvent::ToolExecutionEnd {
                call_id,
                tool_name: tool.name().to_string(),
                status: if is_error { "error" } else { "success" }.to_string(),
                result: outcome.output,
                execution_time,
            })
            .await;
    }
}

async fn step_limit(scope: &str, limit: u32, tx: &mpsc::Sender<ExecEvent>) -> Error {
    let err = Error::StepLimit {
        scope: scope.to_string(),
        limit,
    };
    let _ = tx
        .send(ExecEvent::Error {
            message: err.to_string(),
        })
        .await;
    err
}
