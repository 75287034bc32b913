//! Team orchestration — drives a multi-agent task to completion.
//!
//! The orchestrator loops: pick an agent (the entry agent first, then
//! whatever the decision model chooses), run its reason/act loop on a
//! subtask, append the answer to the shared context, and ask the
//! decision model again. A negative / missing / unparseable id means
//! the task is answered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use tm_domain::error::{Error, Result};
use tm_domain::message::Message;
use tm_providers::{ChatRequest, LlmProvider};

use crate::agent::Agent;
use crate::events::ExecEvent;
use crate::executor::{self, TeamBudget};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Team context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One agent's contribution to the run, in completion order.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub agent_name: String,
    pub output: String,
}

/// Per-run shared state, owned by the orchestrator.
///
/// Invariant: `current_steps <= max_steps`; the counter advances exactly
/// once per executor turn across the whole team.
pub struct TeamContext {
    pub name: String,
    pub description: String,
    pub rule: String,
    pub max_steps: u32,
    pub current_steps: u32,
    pub user_task: String,
    pub agent_outputs: Vec<AgentOutput>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Team
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An ordered set of agents sharing a description, rule, model, and
/// step budget. The first agent is the entry agent.
pub struct Team {
    pub name: String,
    pub description: String,
    pub rule: String,
    /// Model used for decision calls and as the agents' default.
    pub model: Arc<dyn LlmProvider>,
    pub model_name: String,
    pub max_steps: u32,
    pub agents: Vec<Agent>,
}

impl Team {
    /// Run the team on `user_task` until the decision model says done,
    /// the step budget is exhausted, or an agent fails.
    ///
    /// The shutdown flag is observed between agent turns: an in-flight
    /// executor run completes, but no new one is started.
    pub async fn run(
        &mut self,
        user_task: &str,
        shutdown: &AtomicBool,
        tx: &mpsc::Sender<ExecEvent>,
    ) -> Result<Vec<AgentOutput>> {
        if self.agents.is_empty() {
            return Err(Error::Config(format!("team '{}' has no agents", self.name)));
        }

        let mut ctx = TeamContext {
            name: self.name.clone(),
            description: self.description.clone(),
            rule: self.rule.clone(),
            max_steps: self.max_steps,
            current_steps: 0,
            user_task: user_task.to_string(),
            agent_outputs: Vec::new(),
        };
        let mut last_agent: Option<usize> = None;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Err(Error::Other("shutdown requested".into()));
            }

            let (idx, subtask) = if ctx.agent_outputs.is_empty() {
                // Entry agent takes the user task verbatim.
                (0, ctx.user_task.clone())
            } else {
                match self.decide_next(&ctx, last_agent).await {
                    Some(next) => next,
                    None => break,
                }
            };

            let agent_name = self.agents[idx].name.clone();
            tracing::info!(team = %self.name, agent = %agent_name, "agent selected");
            let _ = tx
                .send(ExecEvent::AgentDecision {
                    agent_name: agent_name.clone(),
                    subtask: subtask.clone(),
                })
                .await;

            let prompt = build_task_prompt(&self.agents[idx], &ctx, &subtask);
            let budget = TeamBudget {
                current: &mut ctx.current_steps,
                max: ctx.max_steps,
            };
            let output =
                executor::run_stream(&mut self.agents[idx], Some(budget), &prompt, true, tx)
                    .await?;

            ctx.agent_outputs.push(AgentOutput {
                agent_name,
                output,
            });
            last_agent = Some(idx);
        }

        Ok(ctx.agent_outputs)
    }

    /// Ask the decision model which agent acts next.
    ///
    /// Returns `None` for "done": an explicit negative/missing id, an
    /// unparseable reply, an out-of-range id, or a failed call. The
    /// agent that just spoke is excluded from the candidate list.
    async fn decide_next(
        &self,
        ctx: &TeamContext,
        last_agent: Option<usize>,
    ) -> Option<(usize, String)> {
        let last_name = last_agent.map(|i| self.agents[i].name.as_str());

        let candidates: Vec<String> = self
            .agents
            .iter()
            .enumerate()
            .filter(|(_, a)| Some(a.name.as_str()) != last_name)
            .map(|(i, a)| {
                serde_json::json!({
                    "id": i,
                    "name": a.name,
                    "description": a.description,
                    "system_prompt": a.system_prompt,
                })
                .to_string()
            })
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let prompt = build_decision_prompt(ctx, &candidates.join(", "));

        let req = ChatRequest {
            messages: vec![Message::user(prompt)],
            tools: Vec::new(),
            temperature: Some(0.0),
            max_tokens: None,
            json_mode: true,
            model: Some(self.model_name.clone()),
        };

        let response = match self.model.chat(req).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(team = %self.name, error = %e, "decision call failed");
                return None;
            }
        };

        parse_decision(&response.content).and_then(|(id, subtask)| {
            if id < self.agents.len() {
                Some((id, subtask))
            } else {
                tracing::warn!(team = %self.name, id, "decision chose unknown agent id");
                None
            }
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt building
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn fetch_agents_outputs(ctx: &TeamContext) -> String {
    ctx.agent_outputs
        .iter()
        .map(|o| {
            format!(
                "member name: {}\noutput content: {}\n\n",
                o.agent_name, o.output
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The per-turn prompt handed to the selected agent's executor.
fn build_task_prompt(agent: &Agent, ctx: &TeamContext, subtask: &str) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!(
        "## Role\n\
         Your role: {name}\n\
         Your role description: {description}\n\
         You are handling the subtask as a member of the {team} team. \
         Please answer in the same language as the user's original task.\n\n\
         ## Current task context:\n\
         Current time: {now}\n\
         Team description: {team_description}\n\n\
         ## Other agents output:\n\
         {outputs}\n\n\
         ## Your sub task\n\
         {subtask}",
        name = agent.name,
        description = agent.description,
        team = ctx.name,
        team_description = ctx.description,
        outputs = fetch_agents_outputs(ctx),
    )
}

/// The decision prompt asking which member (if any) acts next.
fn build_decision_prompt(ctx: &TeamContext, candidates: &str) -> String {
    format!(
        "## Role\n\
         You are a team decision expert, please decide whether the next member in the team \
         is needed to complete the user task. If necessary, select the most suitable member \
         and give the subtask that needs to be answered by this member. If not, return \
         {{\"id\": -1}} directly.\n\n\
         ## Team\n\
         Team Name: {name}\n\
         Team Description: {description}\n\
         Team Rules: {rule}\n\n\
         ## List of available members:\n\
         {candidates}\n\n\
         ## Members have replied\n\
         {outputs}\n\n\
         ## Attention\n\
         1. You need to determine whether the next member is needed and which member is the \
         most suitable based on the user's question and the rules of the team\n\
         2. If you think the answers given by the executed members are able to answer the \
         user's questions, return {{\"id\": -1}} immediately; otherwise, select the next \
         suitable member ID and subtask content in the following JSON structure: \
         {{\"id\": <member_id>, \"subtask\": \"\"}}\n\
         3. Always reply in JSON format\n\n\
         ## User Original Task:\n\
         {task}",
        name = ctx.name,
        description = ctx.description,
        rule = ctx.rule,
        outputs = fetch_agents_outputs(ctx),
        task = ctx.user_task,
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decision parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse the decision reply into `(agent_index, subtask)`.
///
/// `None` means done: negative or missing id, or anything unparseable.
/// Models wrap JSON in prose and code fences, so the first balanced
/// object in the reply is what gets parsed.
fn parse_decision(content: &str) -> Option<(usize, String)> {
    let object = match extract_json_object(content) {
        Some(o) => o,
        None => {
            tracing::warn!(reply = content, "decision reply is not JSON; treating as done");
            return None;
        }
    };

    let value: serde_json::Value = match serde_json::from_str(object) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "decision JSON failed to parse; treating as done");
            return None;
        }
    };

    // Accept both numeric and stringified ids.
    let id = match value.get("id") {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match id {
        Some(id) if id >= 0 => {
            let subtask = value
                .get("subtask")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            Some((id as usize, subtask))
        }
        _ => None,
    }
}

/// Find the first balanced `{...}` object in `s`, skipping braces inside
/// JSON strings.
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
