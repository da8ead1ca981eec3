use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome returned by a task invocation.
///
/// `success = false` is a permanent failure: the task wrapper does not retry it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl<T> TaskResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Collapse into the produced data or the failure message.
    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err("task reported success without data".to_string()),
            (false, _) => Err(self
                .error
                .unwrap_or_else(|| "task reported failure".to_string())),
        }
    }
}
