use async_trait::async_trait;

use crate::error::StageError;
use crate::executor::stage::{run_stage, StageInput, StageSpec};
use crate::executor::types::StageReport;

/// Type-erased stage so a pipeline can hold stages with different task
/// output types over the same context.
#[async_trait]
pub trait Stage<C>: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn task_names(&self) -> Vec<String>;

    async fn run(&self, input: &StageInput, ctx: C) -> Result<StageReport<C>, StageError>;
}

#[async_trait]
impl<C, O> Stage<C> for StageSpec<C, O>
where
    C: Send + Sync + 'static,
    O: Send + 'static,
{
    fn name(&self) -> &str {
        StageSpec::name(self)
    }

    fn description(&self) -> Option<&str> {
        StageSpec::description(self)
    }

    fn task_names(&self) -> Vec<String> {
        StageSpec::task_names(self)
    }

    async fn run(&self, input: &StageInput, ctx: C) -> Result<StageReport<C>, StageError> {
        run_stage(self, input, ctx).await
    }
}
