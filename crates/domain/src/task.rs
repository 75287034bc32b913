use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Success,
    Failed,
    Paused,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(TaskStatus::Running),
            "success" => Some(TaskStatus::Success),
            "failed" => Some(TaskStatus::Failed),
            "paused" => Some(TaskStatus::Paused),
            _ => None,
        }
    }
}

/// A persisted task row. Created once by the task worker; only the
/// status is mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub task_status: TaskStatus,
    pub task_name: String,
    pub task_content: String,
    pub submit_time: DateTime<Utc>,
}

impl TaskRecord {
    /// Build a new running task from the submitted text. The display
    /// name is the first 50 characters of the content.
    pub fn new(task_id: String, content: &str) -> Self {
        Self {
            task_id,
            task_status: TaskStatus::Running,
            task_name: truncate_chars(content, 50),
            task_content: content.to_string(),
            submit_time: Utc::now(),
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Query types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct TaskQuery {
    #[serde(default = "d_page")]
    pub page: u32,
    #[serde(default = "d_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// Substring match against the task name.
    #[serde(default)]
    pub task_name: Option<String>,
}

fn d_page() -> u32 {
    1
}

fn d_page_size() -> u32 {
    20
}

impl TaskQuery {
    /// Clamp page/page_size into their valid ranges.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.page_size = self.page_size.clamp(1, 100);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub tasks: Vec<TaskRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_truncates_name_to_fifty_chars() {
        let content = "x".repeat(80);
        let task = TaskRecord::new("t1".into(), &content);
        assert_eq!(task.task_name.chars().count(), 50);
        assert_eq!(task.task_content.len(), 80);
        assert_eq!(task.task_status, TaskStatus::Running);
    }

    #[test]
    fn name_truncation_is_char_safe() {
        // Multibyte content must not be split mid-codepoint.
        let content = "日本語のタスク".repeat(20);
        let task = TaskRecord::new("t1".into(), &content);
        assert_eq!(task.task_name.chars().count(), 50);
    }

    #[test]
    fn query_normalization_clamps_bounds() {
        let q = TaskQuery {
            page: 0,
            page_size: 500,
            status: None,
            task_name: None,
        }
        .normalized();
        assert_eq!(q.page, 1);
        assert_eq!(q.page_size, 100);
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            TaskStatus::Running,
            TaskStatus::Success,
            TaskStatus::Failed,
            TaskStatus::Paused,
        ] {
            assert_eq!(TaskStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(TaskStatus::parse("bogus"), None);
    }
}
