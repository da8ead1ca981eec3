//! Concrete artifact tasks.
//!
//! Each task kind implements [`ArtifactAction`]; [`ArtifactTask`] pairs an
//! action with its scheduling options (criticality, retry, timeout, default)
//! and is what the stage executor runs.

mod command;
mod completion;
mod http;
mod job;
mod upload;

use std::time::Duration;

use artiflow_core::api::{Criticality, RetryOptions, Task, TaskError, TaskInput, TaskResult};
use async_trait::async_trait;

use crate::artifact::{Artifact, ArtifactBundle};

pub use command::CommandAction;
pub use completion::{CompletionAction, CompletionClient};
pub use http::HttpStatusClass;
pub use job::RemoteJobAction;
pub use upload::UploadAction;

/// One external call producing an [`Artifact`].
#[async_trait]
pub trait ArtifactAction: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn run(
        &self,
        input: &TaskInput,
        bundle: &ArtifactBundle,
    ) -> Result<TaskResult<Artifact>, TaskError>;
}

#[derive(Debug, Clone)]
pub struct TaskOptions {
    pub name: String,
    pub criticality: Criticality,
    pub retry: RetryOptions,
    pub timeout: Option<Duration>,
    pub default: Option<Artifact>,
}

impl TaskOptions {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            criticality: Criticality::Required,
            retry: RetryOptions::once(),
            timeout: None,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: Option<Artifact>) -> Self {
        Self {
            criticality: Criticality::Optional,
            default,
            ..Self::required(name)
        }
    }
}

pub struct ArtifactTask {
    opts: TaskOptions,
    action: Box<dyn ArtifactAction>,
}

impl ArtifactTask {
    pub fn new(opts: TaskOptions, action: impl ArtifactAction + 'static) -> Self {
        Self {
            opts,
            action: Box::new(action),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.action.kind()
    }
}

#[async_trait]
impl Task<ArtifactBundle> for ArtifactTask {
    type Output = Artifact;

    fn name(&self) -> &str {
        &self.opts.name
    }

    fn criticality(&self) -> Criticality {
        self.opts.criticality
    }

    fn retry(&self) -> RetryOptions {
        self.opts.retry.clone()
    }

    fn timeout(&self) -> Option<Duration> {
        self.opts.timeout
    }

    fn default_output(&self) -> Option<Artifact> {
        self.opts.default.clone()
    }

    async fn invoke(
        &self,
        input: &TaskInput,
        bundle: &ArtifactBundle,
    ) -> Result<TaskResult<Artifact>, TaskError> {
        tracing::debug!(
            task = %self.opts.name,
            kind = self.action.kind(),
            attempt = input.attempt,
            "invoking task"
        );
        self.action.run(input, bundle).await
    }
}
