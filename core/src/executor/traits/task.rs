use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::TaskError;
use crate::executor::types::{Criticality, TaskInput, TaskResult};
use crate::retry::RetryOptions;

/// One unit of work inside a stage.
///
/// `invoke` returns `Err(TaskError::Transient)` for failures worth retrying;
/// `Ok(TaskResult { success: false, .. })`, `TaskError::Fatal` and
/// `TaskError::Timeout` are final.
#[async_trait]
pub trait Task<C>: Send + Sync {
    type Output: Send + 'static;

    fn name(&self) -> &str;

    fn criticality(&self) -> Criticality {
        Criticality::Required
    }

    fn retry(&self) -> RetryOptions {
        RetryOptions::once()
    }

    /// Per-attempt timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Output substituted when an optional task fails.
    fn default_output(&self) -> Option<Self::Output> {
        None
    }

    async fn invoke(&self, input: &TaskInput, ctx: &C)
        -> Result<TaskResult<Self::Output>, TaskError>;
}

type TaskFn<C, O> =
    Arc<dyn Fn(TaskInput, C) -> BoxFuture<'static, Result<TaskResult<O>, TaskError>> + Send + Sync>;

/// Closure-backed [`Task`]. The closure receives its own copy of the context.
pub struct FnTask<C, O> {
    name: String,
    criticality: Criticality,
    retry: RetryOptions,
    timeout: Option<Duration>,
    default: Option<O>,
    f: TaskFn<C, O>,
}

impl<C, O> FnTask<C, O>
where
    C: Send + 'static,
    O: Send + 'static,
{
    fn build<F, Fut>(name: impl Into<String>, criticality: Criticality, f: F) -> Self
    where
        F: Fn(TaskInput, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskResult<O>, TaskError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            criticality,
            retry: RetryOptions::once(),
            timeout: None,
            default: None,
            f: Arc::new(
                move |input: TaskInput, ctx: C| -> BoxFuture<'static, Result<TaskResult<O>, TaskError>> {
                    Box::pin(f(input, ctx))
                },
            ),
        }
    }

    pub fn required<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(TaskInput, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskResult<O>, TaskError>> + Send + 'static,
    {
        Self::build(name, Criticality::Required, f)
    }

    pub fn optional<F, Fut>(name: impl Into<String>, default: Option<O>, f: F) -> Self
    where
        F: Fn(TaskInput, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskResult<O>, TaskError>> + Send + 'static,
    {
        let mut task = Self::build(name, Criticality::Optional, f);
        task.default = default;
        task
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl<C, O> Task<C> for FnTask<C, O>
where
    C: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn criticality(&self) -> Criticality {
        self.criticality
    }

    fn retry(&self) -> RetryOptions {
        self.retry.clone()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn default_output(&self) -> Option<O> {
        self.default.clone()
    }

    async fn invoke(&self, input: &TaskInput, ctx: &C) -> Result<TaskResult<O>, TaskError> {
        (self.f)(input.clone(), ctx.clone()).await
    }
}
