use thiserror::Error;

use crate::state::{SessionStatus, StepStatus};

/// Step status transition errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("step {step}: invalid transition from {from} to {to}")]
    InvalidTransition {
        step: usize,
        from: StepStatus,
        to: StepStatus,
    },
    #[error("step {step}: cannot transition from terminal state {state}")]
    FromTerminalState { step: usize, state: StepStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("session '{0}' is already initialized")]
    AlreadyInitialized(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("invalid session id '{0}'")]
    InvalidSessionId(String),

    #[error("step {step} out of range (session has {total} steps)")]
    StepOutOfRange { step: usize, total: usize },

    #[error("step {active} is still in progress, cannot start step {requested}")]
    StepAlreadyActive { active: usize, requested: usize },

    #[error("session '{session_id}' is {status}, no further writes accepted")]
    SessionTerminal {
        session_id: String,
        status: SessionStatus,
    },

    #[error("cannot complete session: steps {0:?} are not completed")]
    IncompleteSteps(Vec<usize>),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for ProgressError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ProgressError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("snapshot encoding: {err}"))
    }
}
