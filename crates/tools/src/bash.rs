//! Bash tool — execute a shell command with a denylist and a hard timeout.
//!
//! The denylist is the only sandboxing layer: destructive base commands
//! are refused outright, as are `sudo`/`su` and recursive/forced `rm`
//! anywhere in the command line. Output (stdout + stderr merged) is
//! tail-truncated to keep tool results bounded.

use crate::{AgentView, Tool, ToolOutcome};
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use tm_domain::config::BashConfig;
use tokio::process::Command;

/// Base commands that are never allowed, regardless of arguments.
const BANNED_COMMANDS: &[&str] = &[
    "halt", "poweroff", "shutdown", "reboot", "rm", "kill", "exit", "sudo", "su", "userdel",
    "groupdel", "logout", "alias",
];

/// Patterns that make a command line unsafe wherever they appear.
const DENIED_PATTERNS: &[&str] = &[
    r"(?i)\bsudo\s",
    r"(?i)\bsu\s+-",
    r"\brm\s+(-\w*[rf]\w*\s*)+",
];

#[derive(Debug, Deserialize)]
struct BashArgs {
    command: String,
    /// Timeout in seconds; defaults to the configured value.
    timeout: Option<u64>,
}

pub struct BashTool {
    config: BashConfig,
    denied: regex::RegexSet,
}

impl BashTool {
    pub fn new(config: BashConfig) -> Self {
        let denied = regex::RegexSet::new(DENIED_PATTERNS)
            .expect("denylist patterns are static and must compile");
        Self { config, denied }
    }

    fn is_safe_command(&self, command: &str) -> bool {
        let base = match command.split_whitespace().next() {
            Some(first) => first.rsplit('/').next().unwrap_or(first).to_lowercase(),
            None => return false,
        };
        if BANNED_COMMANDS.contains(&base.as_str()) {
            return false;
        }
        !self.denied.is_match(command)
    }
}

#[async_trait::async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command in the current working directory. Returns combined \
         stdout and stderr; long output is truncated to the tail."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Bash command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (optional, default: 30)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, _view: &AgentView) -> ToolOutcome {
        let args: BashArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::fail(format!("invalid bash arguments: {e}")),
        };

        let command = args.command.trim();
        if command.is_empty() {
            return ToolOutcome::fail("command parameter is required");
        }
        if !self.is_safe_command(command) {
            return ToolOutcome::fail(format!(
                "command '{command}' is not allowed for security reasons"
            ));
        }

        let timeout_sec = args.timeout.unwrap_or(self.config.timeout_sec);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let run = async {
            let output = cmd.output().await?;
            Ok::<_, std::io::Error>(output)
        };

        let output = match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_sec),
            run,
        )
        .await
        {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return ToolOutcome::fail(format!("failed to spawn: {e}")),
            Err(_) => {
                return ToolOutcome::fail(format!(
                    "command timed out after {timeout_sec} seconds"
                ))
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        let text = truncate_tail(&combined, self.config.max_output_bytes);
        let exit_code = output.status.code().unwrap_or(-1);

        let result = serde_json::json!({
            "output": if text.is_empty() { "(no output)".to_string() } else { text },
            "exit_code": exit_code,
        });

        if output.status.success() {
            ToolOutcome::ok(result)
        } else {
            tracing::debug!(exit_code, "bash command exited nonzero");
            ToolOutcome {
                status: crate::ToolStatus::Error,
                output: result,
            }
        }
    }
}

/// Keep the last `max_bytes` of `s`, cutting on a char boundary and
/// prefixing a marker when anything was dropped.
fn truncate_tail(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!(
        "[output truncated: showing last {} of {} bytes]\n{}",
        s.len() - start,
        s.len(),
        &s[start..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> BashTool {
        BashTool::new(BashConfig::default())
    }

    fn view() -> AgentView {
        AgentView::default()
    }

    #[test]
    fn denylist_blocks_destructive_commands() {
        let t = tool();
        assert!(!t.is_safe_command("rm file.txt"));
        assert!(!t.is_safe_command("sudo apt install vim"));
        assert!(!t.is_safe_command("shutdown -h now"));
        assert!(!t.is_safe_command("find . -name x -exec rm -rf {} \\;"));
        assert!(!t.is_safe_command("echo hi && sudo reboot"));
    }

    #[test]
    fn denylist_allows_ordinary_commands() {
        let t = tool();
        assert!(t.is_safe_command("ls -la"));
        assert!(t.is_safe_command("echo hello"));
        assert!(t.is_safe_command("grep -r 'rma' src"));
        assert!(!t.is_safe_command(""));
    }

    #[test]
    fn truncate_tail_keeps_the_end() {
        let s = "a".repeat(100) + "END";
        let out = truncate_tail(&s, 10);
        assert!(out.ends_with("END"));
        assert!(out.starts_with("[output truncated"));
        assert_eq!(truncate_tail("short", 100), "short");
    }

    #[tokio::test]
    async fn executes_command_and_captures_output() {
        let t = tool();
        let outcome = t
            .execute(serde_json::json!({"command": "echo hello"}), &view())
            .await;
        assert!(!outcome.is_error());
        assert!(outcome.output["output"]
            .as_str()
            .unwrap()
            .contains("hello"));
        assert_eq!(outcome.output["exit_code"], 0);
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error_outcome() {
        let t = tool();
        let outcome = t
            .execute(serde_json::json!({"command": "false"}), &view())
            .await;
        assert!(outcome.is_error());
        assert_eq!(outcome.output["exit_code"], 1);
    }

    #[tokio::test]
    async fn blocked_command_is_refused_without_running() {
        let t = tool();
        let outcome = t
            .execute(serde_json::json!({"command": "rm -rf /tmp/x"}), &view())
            .await;
        assert!(outcome.is_error());
        assert!(outcome
            .output
            .as_str()
            .unwrap()
            .contains("not allowed"));
    }

    #[tokio::test]
    async fn timeout_kills_the_command() {
        let t = tool();
        let outcome = t
            .execute(
                serde_json::json!({"command": "sleep 5", "timeout": 1}),
                &view(),
            )
            .await;
        assert!(outcome.is_error());
        assert!(outcome.output.as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_command_is_an_error() {
        let t = tool();
        let outcome = t.execute(serde_json::json!({}), &view()).await;
        assert!(outcome.is_error());
    }
}
