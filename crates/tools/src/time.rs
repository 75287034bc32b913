//! Current time tool.

use crate::{AgentView, Tool, ToolOutcome};
use serde_json::Value;

pub struct CurrentTimeTool;

#[async_trait::async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value, _view: &AgentView) -> ToolOutcome {
        let now = chrono::Local::now();
        ToolOutcome::ok(serde_json::json!({
            "time": now.format("%Y-%m-%d %H:%M:%S").to_string(),
            "timezone": now.offset().to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_a_formatted_timestamp() {
        let outcome = CurrentTimeTool
            .execute(serde_json::json!({}), &AgentView::default())
            .await;
        assert!(!outcome.is_error());
        let time = outcome.output["time"].as_str().unwrap();
        // "YYYY-MM-DD HH:MM:SS"
        assert_eq!(time.len(), 19);
    }
}
