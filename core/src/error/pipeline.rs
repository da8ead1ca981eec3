use thiserror::Error;

use super::ProgressError;

/// Errors that stop a pipeline run outside the task result contract.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("session '{0}' already has an active run")]
    SessionBusy(String),

    #[error("pipeline '{0}' has no stages")]
    EmptyPipeline(String),

    #[error("progress store error: {0}")]
    Progress(#[from] ProgressError),

    /// Programming errors: aggregation failures, panicking tasks, broken invariants.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// A stage that stopped with an error after its tasks settled.
///
/// `warnings` holds the optional-task warnings gathered before the stage
/// stopped, so they can still be recorded on the step.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct StageError {
    #[source]
    pub error: PipelineError,
    pub warnings: Vec<String>,
}

impl StageError {
    pub fn new(error: PipelineError, warnings: Vec<String>) -> Self {
        Self { error, warnings }
    }
}

impl From<PipelineError> for StageError {
    fn from(error: PipelineError) -> Self {
        Self::new(error, Vec::new())
    }
}
