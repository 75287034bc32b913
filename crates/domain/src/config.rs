//! Configuration tree, deserialized from a single TOML document.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// Team definitions (key = team name).
    #[serde(default)]
    pub teams: HashMap<String, TeamConfig>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server / storage / workspace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
        }
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}

fn d_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite file holding the tasks table.
    #[serde(default = "d_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: d_db_path() }
    }
}

fn d_db_path() -> PathBuf {
    PathBuf::from("taskmesh.db")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root directory file tools are confined to.
    #[serde(default = "d_workspace_path")]
    pub path: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            path: d_workspace_path(),
        }
    }
}

fn d_workspace_path() -> PathBuf {
    PathBuf::from("./workspace")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub bash: BashConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BashConfig {
    /// Hard timeout for a single command, in seconds.
    #[serde(default = "d_bash_timeout")]
    pub timeout_sec: u64,
    /// Cap on captured combined output, in bytes; the tail is kept.
    #[serde(default = "d_bash_max_output")]
    pub max_output_bytes: usize,
}

impl Default for BashConfig {
    fn default() -> Self {
        Self {
            timeout_sec: d_bash_timeout(),
            max_output_bytes: d_bash_max_output(),
        }
    }
}

fn d_bash_timeout() -> u64 {
    30
}

fn d_bash_max_output() -> usize {
    30 * 1024
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    /// Registered providers (data-driven: adding a provider = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique id, used in logs and error messages.
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Model names this provider serves. A request for any of these is
    /// routed here; the first listed model is the provider's default.
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenaiCompat,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Teams
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    #[serde(default)]
    pub description: String,
    /// Collaboration rules injected into the decision prompt.
    #[serde(default)]
    pub rule: String,
    /// Model used for agents without an override and for the decision call.
    pub model: String,
    /// Team-wide budget on executor turns across all agents.
    #[serde(default = "d_team_max_steps")]
    pub max_steps: u32,
    /// Ordered: the first agent is the entry agent.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

fn d_team_max_steps() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Optional model override; defaults to the team model.
    #[serde(default)]
    pub model: Option<String>,
    /// Per-agent cap on reason/act turns.
    #[serde(default = "d_agent_max_steps")]
    pub max_steps: u32,
    /// Tool names resolved against the registry at startup.
    #[serde(default)]
    pub tools: Vec<String>,
}

fn d_agent_max_steps() -> u32 {
    100
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the loaded config. Errors make the gateway refuse to
    /// start; warnings are logged and ignored.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.llm.providers.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "llm.providers".into(),
                message: "no LLM providers configured; every task will fail at start".into(),
            });
        }

        let mut seen_ids = std::collections::HashSet::new();
        for pc in &self.llm.providers {
            if !seen_ids.insert(pc.id.as_str()) {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers.{}", pc.id),
                    message: "duplicate provider id".into(),
                });
            }
            if pc.models.is_empty() {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Warning,
                    field: format!("llm.providers.{}", pc.id),
                    message: "provider lists no models and will never be selected".into(),
                });
            }
        }

        for (name, team) in &self.teams {
            if team.agents.is_empty() {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: format!("teams.{name}"),
                    message: "team has no agents".into(),
                });
            }
            let mut agent_names = std::collections::HashSet::new();
            for agent in &team.agents {
                if !agent_names.insert(agent.name.as_str()) {
                    issues.push(ConfigIssue {
                        severity: ConfigSeverity::Error,
                        field: format!("teams.{name}.agents.{}", agent.name),
                        message: "duplicate agent name within team".into(),
                    });
                }
                if agent.max_steps == 0 {
                    issues.push(ConfigIssue {
                        severity: ConfigSeverity::Error,
                        field: format!("teams.{name}.agents.{}", agent.name),
                        message: "max_steps must be at least 1".into(),
                    });
                }
            }
            if team.max_steps == 0 {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    field: format!("teams.{name}.max_steps"),
                    message: "max_steps must be at least 1".into(),
                });
            }
        }

        issues
    }
}
