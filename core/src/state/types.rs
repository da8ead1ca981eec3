//! Status enums and progress events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast after every committed write to the progress store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    SessionInitialized {
        session_id: String,
        total_steps: usize,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        session_id: String,
        step: usize,
        name: String,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        session_id: String,
        step: usize,
        timestamp: DateTime<Utc>,
    },
    StepWarning {
        session_id: String,
        step: usize,
        warning: String,
        timestamp: DateTime<Utc>,
    },
    StepFailed {
        session_id: String,
        step: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    SessionFailed {
        session_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionInitialized { session_id, .. }
            | Self::StepStarted { session_id, .. }
            | Self::StepCompleted { session_id, .. }
            | Self::StepWarning { session_id, .. }
            | Self::StepFailed { session_id, .. }
            | Self::SessionCompleted { session_id, .. }
            | Self::SessionFailed { session_id, .. } => session_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SessionInitialized { timestamp, .. }
            | Self::StepStarted { timestamp, .. }
            | Self::StepCompleted { timestamp, .. }
            | Self::StepWarning { timestamp, .. }
            | Self::StepFailed { timestamp, .. }
            | Self::SessionCompleted { timestamp, .. }
            | Self::SessionFailed { timestamp, .. } => *timestamp,
        }
    }
}
