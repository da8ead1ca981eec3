use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-invocation information handed to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInput {
    pub session_id: String,
    /// 1-based step number of the owning stage.
    pub step: usize,
    pub stage_name: String,
    pub task_name: String,
    /// 1-based attempt number within the current retry loop.
    pub attempt: u32,
}

/// Whether a task's failure aborts the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    #[default]
    Required,
    /// Failure degrades to the declared default output plus a step warning.
    Optional,
}

/// A required task that did not produce output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task: String,
    pub error: String,
    pub attempts: u32,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task '{}' failed after {} attempt(s): {}",
            self.task, self.attempts, self.error
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded,
    /// Optional task failed and its default output was used.
    Defaulted,
    Failed,
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task: String,
    pub required: bool,
    pub status: TaskStatus,
    pub attempts: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}
