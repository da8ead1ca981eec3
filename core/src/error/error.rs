use thiserror::Error;

use super::{PipelineError, ProgressError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("progress store error: {0}")]
    Progress(#[from] ProgressError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
