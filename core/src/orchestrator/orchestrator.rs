use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::task::JoinHandle;

use super::pipeline::Pipeline;
use super::registry::{RunGuard, RunRegistry};
use crate::error::PipelineError;
use crate::executor::{panic_message, RenderEvent, RunRenderer, StageInput};
use crate::state::ProgressStore;

/// Why a run ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A required task exhausted its attempts.
    RequiredTask,
    /// Anything outside the task result contract: aggregator error, panic,
    /// progress store failure.
    Internal,
}

#[derive(Debug, Clone)]
pub enum RunOutcome<C> {
    Completed {
        context: C,
    },
    Failed {
        /// Step that was marked failed; `None` when the session failed before
        /// any step started.
        step: Option<usize>,
        error: String,
        kind: FailureKind,
    },
}

impl<C> RunOutcome<C> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn context(&self) -> Option<&C> {
        match self {
            Self::Completed { context } => Some(context),
            Self::Failed { .. } => None,
        }
    }
}

/// Drives a [`Pipeline`] stage by stage for one session at a time and records
/// every transition in the progress store.
pub struct Orchestrator<C> {
    pipeline: Arc<Pipeline<C>>,
    store: Arc<dyn ProgressStore>,
    renderer: Option<Arc<dyn RunRenderer>>,
    registry: RunRegistry,
    max_parallel: usize,
}

impl<C> Clone for Orchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            store: self.store.clone(),
            renderer: self.renderer.clone(),
            registry: self.registry.clone(),
            max_parallel: self.max_parallel,
        }
    }
}

impl<C> Orchestrator<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(pipeline: Pipeline<C>, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            store,
            renderer: None,
            registry: RunRegistry::new(),
            max_parallel: 0,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn RunRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Cap on concurrently running tasks within a fan-out stage; 0 means unbounded.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn pipeline(&self) -> &Pipeline<C> {
        &self.pipeline
    }

    pub fn store(&self) -> Arc<dyn ProgressStore> {
        self.store.clone()
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Fresh run of a new session.
    pub async fn trigger(&self, session_id: &str, ctx: C) -> Result<RunOutcome<C>, PipelineError> {
        self.run(session_id, ctx, false).await
    }

    /// Re-initialize the session and replay every stage from the first.
    pub async fn retry(&self, session_id: &str, ctx: C) -> Result<RunOutcome<C>, PipelineError> {
        self.run(session_id, ctx, true).await
    }

    /// Run to completion.
    ///
    /// `Err` means the run never started (busy session, existing session
    /// without `reset`, empty pipeline). Once started, every failure is
    /// recorded in the store and reported as [`RunOutcome::Failed`].
    #[tracing::instrument(name = "pipeline.run", skip(self, ctx), fields(pipeline = %self.pipeline.name()))]
    pub async fn run(
        &self,
        session_id: &str,
        ctx: C,
        reset: bool,
    ) -> Result<RunOutcome<C>, PipelineError> {
        let guard = self.begin(session_id, reset).await?;
        Ok(self.execute(guard, ctx).await)
    }

    /// Claim and initialize the session now, then drive it in the background.
    ///
    /// Initialization errors are returned to the caller; the handle resolves
    /// with the outcome of the run.
    pub async fn spawn(
        &self,
        session_id: &str,
        ctx: C,
        reset: bool,
    ) -> Result<JoinHandle<RunOutcome<C>>, PipelineError> {
        let guard = self.begin(session_id, reset).await?;
        let this = self.clone();
        Ok(tokio::spawn(async move { this.execute(guard, ctx).await }))
    }

    async fn begin(&self, session_id: &str, reset: bool) -> Result<RunGuard, PipelineError> {
        if self.pipeline.is_empty() {
            return Err(PipelineError::EmptyPipeline(self.pipeline.name().to_string()));
        }
        let guard = self.registry.claim(session_id)?;
        self.store
            .initialize(session_id, &self.pipeline.stage_names(), reset)
            .await?;
        Ok(guard)
    }

    async fn execute(&self, guard: RunGuard, ctx: C) -> RunOutcome<C> {
        let session_id = guard.session_id().to_string();
        let started = Instant::now();
        self.render(RenderEvent::RunStart {
            session_id: session_id.clone(),
            pipeline: self.pipeline.name().to_string(),
            total_stages: self.pipeline.len(),
        });

        let outcome = match AssertUnwindSafe(self.drive(&session_id, ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => self.fail_internal(&session_id, err.to_string()).await,
            Err(panic) => {
                let msg = format!("panic: {}", panic_message(panic.as_ref()));
                self.fail_internal(&session_id, msg).await
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let (failed_step, error) = match &outcome {
            RunOutcome::Completed { .. } => {
                tracing::info!(session_id = %session_id, duration_ms, "pipeline completed");
                (None, None)
            }
            RunOutcome::Failed { step, error, kind } => {
                tracing::error!(
                    session_id = %session_id,
                    step = ?step,
                    kind = ?kind,
                    error = %error,
                    duration_ms,
                    "pipeline failed"
                );
                (*step, Some(error.clone()))
            }
        };
        self.render(RenderEvent::RunEnd {
            session_id,
            success: outcome.is_completed(),
            failed_step,
            error,
            duration_ms,
        });

        drop(guard);
        outcome
    }

    async fn drive(&self, session_id: &str, mut ctx: C) -> Result<RunOutcome<C>, PipelineError> {
        let total = self.pipeline.len();

        for (idx, stage) in self.pipeline.stages().iter().enumerate() {
            let step = idx + 1;
            let message = stage
                .description()
                .map(str::to_string)
                .unwrap_or_else(|| format!("running {}", stage.name()));
            self.store.start_step(session_id, step, Some(message)).await?;

            let stage_started = Instant::now();
            self.render(RenderEvent::StageStart {
                session_id: session_id.to_string(),
                step,
                total_stages: total,
                stage: stage.name().to_string(),
                tasks: stage.task_names(),
            });

            let input = StageInput {
                session_id: session_id.to_string(),
                step,
                total_stages: total,
                max_parallel: self.max_parallel,
                renderer: self.renderer.clone(),
            };
            let report = match stage.run(&input, ctx).await {
                Ok(report) => report,
                Err(failure) => {
                    self.record_warnings(session_id, step, &failure.warnings).await?;
                    return Err(failure.error);
                }
            };
            self.record_warnings(session_id, step, &report.warnings).await?;

            self.render(RenderEvent::StageEnd {
                session_id: session_id.to_string(),
                step,
                stage: stage.name().to_string(),
                success: report.is_success(),
                warnings: report.warnings.clone(),
                duration_ms: stage_started.elapsed().as_millis() as u64,
            });

            if let Some(failure) = &report.critical_failure {
                let error = failure.to_string();
                self.store.fail_step(session_id, step, error.clone()).await?;
                return Ok(RunOutcome::Failed {
                    step: Some(step),
                    error,
                    kind: FailureKind::RequiredTask,
                });
            }

            self.store
                .complete_step(session_id, step, Some(report.summary()))
                .await?;
            ctx = report.context;
        }

        self.store.complete(session_id).await?;
        Ok(RunOutcome::Completed { context: ctx })
    }

    async fn record_warnings(
        &self,
        session_id: &str,
        step: usize,
        warnings: &[String],
    ) -> Result<(), PipelineError> {
        for warning in warnings {
            self.store
                .add_step_warning(session_id, step, warning.clone())
                .await?;
        }
        Ok(())
    }

    /// Record an error that escaped the stage loop against the active step,
    /// or against the session when no step is active.
    async fn fail_internal(&self, session_id: &str, error: String) -> RunOutcome<C> {
        let step = match self.store.current_in_progress_step(session_id).await {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(session_id, error = %e, "cannot read active step");
                None
            }
        };

        let recorded = match step {
            Some(n) => self.store.fail_step(session_id, n, error.clone()).await,
            None => self.store.fail_session(session_id, error.clone()).await,
        };
        if let Err(e) = recorded {
            tracing::error!(session_id, error = %e, "failed to record internal error");
        }

        RunOutcome::Failed {
            step,
            error,
            kind: FailureKind::Internal,
        }
    }

    fn render(&self, event: RenderEvent) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&event);
        }
    }
}
