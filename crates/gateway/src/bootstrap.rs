//! Startup wiring: config → registries → shared state, and per-run team
//! construction.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tm_domain::config::Config;
use tm_domain::error::{Error, Result};
use tm_engine::{Agent, Team};
use tm_providers::ModelRegistry;
use tm_tools::ToolRegistry;

use crate::bus::EventBus;
use crate::state::AppState;
use crate::store::TaskStore;
use crate::worker::WorkerTracker;

/// Build the shared application state from a validated config.
pub fn build_state(config: Config) -> Result<AppState> {
    let models = ModelRegistry::from_config(&config.llm)?;
    let tools = ToolRegistry::from_config(&config);
    let store = TaskStore::open(&config.database.path)?;

    Ok(AppState {
        config: Arc::new(config),
        models: Arc::new(models),
        tools: Arc::new(tools),
        store: Arc::new(store),
        bus: Arc::new(EventBus::new()),
        workers: Arc::new(WorkerTracker::new()),
        shutdown: Arc::new(AtomicBool::new(false)),
    })
}

/// Build a fresh [`Team`] for one run.
///
/// Teams are templates in config; every run gets new agent state, so a
/// failed or trimmed run never leaks history into the next one. Unknown
/// team, model, or tool names fail here, before a task row exists.
pub fn build_team(state: &AppState, team_name: &str) -> Result<Team> {
    let team_config = state
        .config
        .teams
        .get(team_name)
        .ok_or_else(|| Error::Config(format!("unknown team '{team_name}'")))?;

    let team_model = state.models.for_model(&team_config.model)?;

    let mut agents = Vec::with_capacity(team_config.agents.len());
    for agent_config in &team_config.agents {
        let (model, model_name) = match &agent_config.model {
            Some(name) => (state.models.for_model(name)?, name.clone()),
            None => (team_model.clone(), team_config.model.clone()),
        };
        let tools = state.tools.resolve(&agent_config.tools)?;

        agents.push(Agent {
            name: agent_config.name.clone(),
            description: agent_config.description.clone(),
            system_prompt: agent_config.system_prompt.clone(),
            model,
            model_name,
            tools,
            max_steps: agent_config.max_steps,
            messages: Vec::new(),
            captured_actions: Vec::new(),
        });
    }

    Ok(Team {
        name: team_name.to_string(),
        description: team_config.description.clone(),
        rule: team_config.rule.clone(),
        model: team_model,
        model_name: team_config.model.clone(),
        max_steps: team_config.max_steps,
        agents,
    })
}
