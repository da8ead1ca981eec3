use serde_json::{json, Value};

use super::task::{TaskFailure, TaskSummary};

/// Outputs handed to a stage aggregator, in task declaration order.
///
/// Failed optional tasks appear with their default output; optional tasks
/// without a default are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutputs<O> {
    entries: Vec<(String, O)>,
}

impl<O> StageOutputs<O> {
    pub fn new(entries: Vec<(String, O)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, task: &str) -> Option<&O> {
        self.entries
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, output)| output)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &O)> {
        self.entries.iter().map(|(name, o)| (name.as_str(), o))
    }

    pub fn into_values(self) -> Vec<O> {
        self.entries.into_iter().map(|(_, o)| o).collect()
    }
}

impl<O> IntoIterator for StageOutputs<O> {
    type Item = (String, O);
    type IntoIter = std::vec::IntoIter<(String, O)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// What a stage run produced.
#[derive(Debug, Clone)]
pub struct StageReport<C> {
    /// Aggregated context, or the input context untouched when the stage
    /// failed critically.
    pub context: C,
    /// First required failure in declaration order.
    pub critical_failure: Option<TaskFailure>,
    pub warnings: Vec<String>,
    pub tasks: Vec<TaskSummary>,
}

impl<C> StageReport<C> {
    pub fn is_success(&self) -> bool {
        self.critical_failure.is_none()
    }

    /// Payload stored as the step result.
    pub fn summary(&self) -> Value {
        json!({
            "tasks": self.tasks,
            "warnings": self.warnings,
        })
    }
}
