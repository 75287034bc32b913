//! Tool registry — name → tool instance, populated once at startup.
//!
//! Read-only after construction: agents resolve their configured tool
//! names against it when teams are built, and the executor resolves
//! call names at dispatch time.

use crate::bash::BashTool;
use crate::files::{FileReadTool, FileWriteTool};
use crate::save::FileSaveTool;
use crate::time::CurrentTimeTool;
use crate::{Tool, ToolStage};
use std::collections::HashMap;
use std::sync::Arc;
use tm_domain::config::Config;
use tm_domain::error::{Error, Result};

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Build the registry with all built-in tools, configured from the
    /// application config.
    pub fn from_config(config: &Config) -> Self {
        let workspace = config.workspace.path.clone();
        let builtins: Vec<Arc<dyn Tool>> = vec![
            Arc::new(BashTool::new(config.tools.bash.clone())),
            Arc::new(FileReadTool::new(workspace.clone())),
            Arc::new(FileWriteTool::new(workspace.clone())),
            Arc::new(CurrentTimeTool),
            Arc::new(FileSaveTool::new(workspace)),
        ];

        let mut tools = HashMap::new();
        for tool in builtins {
            tools.insert(tool.name().to_string(), tool);
        }
        Self { tools }
    }

    #[cfg(test)]
    pub(crate) fn from_tools(list: Vec<Arc<dyn Tool>>) -> Self {
        let mut tools = HashMap::new();
        for tool in list {
            tools.insert(tool.name().to_string(), tool);
        }
        Self { tools }
    }

    /// Resolve a tool by name regardless of stage.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Resolve a tool the LLM asked to invoke. Post-process tools are
    /// not callable through tool-calls.
    pub fn get_pre_process(&self, name: &str) -> Option<Arc<dyn Tool>> {
        match self.tools.get(name) {
            Some(tool) if tool.stage() == ToolStage::PreProcess => Some(tool.clone()),
            Some(_) => {
                tracing::warn!(tool = name, "post-process tool cannot be called directly");
                None
            }
            None => None,
        }
    }

    /// Resolve a configured tool list for an agent, failing on unknown
    /// names so misconfiguration surfaces at startup.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Tool>>> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| Error::Config(format!("unknown tool '{name}'")))
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AgentView, ToolOutcome};
    use serde_json::Value;

    struct DummyTool {
        stage: ToolStage,
    }

    #[async_trait::async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str {
            match self.stage {
                ToolStage::PreProcess => "pre",
                ToolStage::PostProcess => "post",
            }
        }
        fn description(&self) -> &str {
            "dummy"
        }
        fn parameters(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        fn stage(&self) -> ToolStage {
            self.stage
        }
        async fn execute(&self, _args: Value, _view: &AgentView) -> ToolOutcome {
            ToolOutcome::ok(Value::Null)
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::from_tools(vec![
            Arc::new(DummyTool {
                stage: ToolStage::PreProcess,
            }),
            Arc::new(DummyTool {
                stage: ToolStage::PostProcess,
            }),
        ])
    }

    #[test]
    fn pre_process_lookup_rejects_post_process_tools() {
        let reg = registry();
        assert!(reg.get_pre_process("pre").is_some());
        assert!(reg.get_pre_process("post").is_none());
        assert!(reg.get_pre_process("missing").is_none());
    }

    #[test]
    fn resolve_fails_on_unknown_name() {
        let reg = registry();
        let err = match reg.resolve(&["pre".into(), "nope".into()]) {
            Err(e) => e,
            Ok(_) => panic!("expected resolve to fail on unknown tool name"),
        };
        assert!(err.to_string().contains("unknown tool 'nope'"));
    }
}
