use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;

use super::scheduler::settle_all;
use super::traits::{RenderEvent, RunRenderer, Task};
use super::types::{
    Criticality, StageOutputs, StageReport, TaskFailure, TaskInput, TaskStatus, TaskSummary,
};
use crate::error::{PipelineError, StageError, TaskError};
use crate::retry::execute_with_retry;

/// Folds the outputs of a stage into the context for the next stage.
pub type Aggregator<C, O> =
    Box<dyn Fn(C, StageOutputs<O>) -> Result<C, PipelineError> + Send + Sync>;

/// Ordered tasks producing `O` plus the aggregation step.
pub struct StageSpec<C, O> {
    name: String,
    description: Option<String>,
    tasks: Vec<Box<dyn Task<C, Output = O>>>,
    aggregate: Aggregator<C, O>,
}

impl<C, O> StageSpec<C, O>
where
    C: Send + Sync,
    O: Send + 'static,
{
    pub fn new<F>(name: impl Into<String>, aggregate: F) -> Self
    where
        F: Fn(C, StageOutputs<O>) -> Result<C, PipelineError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            tasks: Vec::new(),
            aggregate: Box::new(aggregate),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn task<T>(mut self, task: T) -> Self
    where
        T: Task<C, Output = O> + 'static,
    {
        self.tasks.push(Box::new(task));
        self
    }

    pub fn boxed_task(mut self, task: Box<dyn Task<C, Output = O>>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name().to_string()).collect()
    }
}

/// Run-scoped information for one stage execution.
#[derive(Clone)]
pub struct StageInput {
    pub session_id: String,
    /// 1-based step number.
    pub step: usize,
    pub total_stages: usize,
    /// Cap on concurrently running tasks; 0 means unbounded.
    pub max_parallel: usize,
    pub renderer: Option<Arc<dyn RunRenderer>>,
}

impl StageInput {
    pub fn new(session_id: impl Into<String>, step: usize) -> Self {
        Self {
            session_id: session_id.into(),
            step,
            total_stages: step,
            max_parallel: 0,
            renderer: None,
        }
    }

    fn render(&self, event: RenderEvent) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&event);
        }
    }
}

enum TaskOutcome<O> {
    Succeeded(O),
    Failed(String),
    Panicked(String),
}

struct TaskRun<O> {
    outcome: TaskOutcome<O>,
    status: TaskStatus,
    /// Fallback output of an optional task that failed.
    default: Option<O>,
    attempts: u32,
    duration_ms: u64,
    metadata: HashMap<String, Value>,
}

fn settled_status<O>(outcome: &TaskOutcome<O>, required: bool, has_default: bool) -> TaskStatus {
    match outcome {
        TaskOutcome::Succeeded(_) => TaskStatus::Succeeded,
        TaskOutcome::Panicked(_) => TaskStatus::Panicked,
        TaskOutcome::Failed(_) if !required && has_default => TaskStatus::Defaulted,
        TaskOutcome::Failed(_) => TaskStatus::Failed,
    }
}

/// Run every task of `stage` and fold their outputs into `ctx`.
///
/// A single task is awaited directly; several tasks are all awaited to
/// completion ("settle all"), so one failure never cancels its siblings.
/// Required failures become `critical_failure` (aggregation is skipped and
/// `ctx` comes back unchanged); optional failures become warnings. A panicking
/// task is an internal error, reported after every sibling has settled. The
/// warnings gathered up to that point travel with the [`StageError`].
pub async fn run_stage<C, O>(
    stage: &StageSpec<C, O>,
    input: &StageInput,
    ctx: C,
) -> Result<StageReport<C>, StageError>
where
    C: Send + Sync,
    O: Send + 'static,
{
    let started = Instant::now();
    tracing::info!(
        session_id = %input.session_id,
        step = input.step,
        stage = %stage.name,
        tasks = stage.tasks.len(),
        "stage started"
    );

    let runs: Vec<TaskRun<O>> = if stage.tasks.len() == 1 {
        vec![run_task(stage.tasks[0].as_ref(), &stage.name, input, &ctx).await]
    } else {
        let futs = stage
            .tasks
            .iter()
            .map(|task| run_task(task.as_ref(), &stage.name, input, &ctx))
            .collect();
        settle_all(futs, input.max_parallel).await
    };

    let mut outputs = Vec::with_capacity(runs.len());
    let mut warnings = Vec::new();
    let mut summaries = Vec::with_capacity(runs.len());
    let mut critical_failure: Option<TaskFailure> = None;
    let mut panicked: Option<String> = None;

    for (task, run) in stage.tasks.iter().zip(runs) {
        let name = task.name().to_string();
        let required = task.criticality() == Criticality::Required;

        let status = run.status;
        let error = match run.outcome {
            TaskOutcome::Succeeded(output) => {
                outputs.push((name.clone(), output));
                None
            }
            TaskOutcome::Panicked(msg) => {
                tracing::error!(task = %name, panic = %msg, "task panicked");
                panicked.get_or_insert_with(|| format!("task '{name}' panicked: {msg}"));
                Some(msg)
            }
            TaskOutcome::Failed(err) if required => {
                tracing::error!(
                    task = %name,
                    attempts = run.attempts,
                    error = %err,
                    "required task failed"
                );
                critical_failure.get_or_insert_with(|| TaskFailure {
                    task: name.clone(),
                    error: err.clone(),
                    attempts: run.attempts,
                });
                Some(err)
            }
            TaskOutcome::Failed(err) => match run.default {
                Some(default) => {
                    tracing::warn!(task = %name, error = %err, "optional task failed, using default output");
                    warnings.push(format!(
                        "optional task '{name}' failed, default output used: {err}"
                    ));
                    outputs.push((name.clone(), default));
                    Some(err)
                }
                None => {
                    tracing::warn!(task = %name, error = %err, "optional task failed, output omitted");
                    warnings.push(format!(
                        "optional task '{name}' failed, output omitted: {err}"
                    ));
                    Some(err)
                }
            },
        };

        summaries.push(TaskSummary {
            task: name,
            required,
            status,
            attempts: run.attempts,
            duration_ms: run.duration_ms,
            error,
            metadata: run.metadata,
        });
    }

    if let Some(msg) = panicked {
        return Err(StageError::new(PipelineError::Internal(msg), warnings));
    }

    let success = critical_failure.is_none();
    let context = match critical_failure {
        Some(_) => ctx,
        None => match (stage.aggregate)(ctx, StageOutputs::new(outputs)) {
            Ok(context) => context,
            Err(error) => return Err(StageError::new(error, warnings)),
        },
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        session_id = %input.session_id,
        step = input.step,
        stage = %stage.name,
        success,
        warnings = warnings.len(),
        duration_ms,
        "stage finished"
    );

    Ok(StageReport {
        context,
        critical_failure,
        warnings,
        tasks: summaries,
    })
}

async fn run_task<C, O>(
    task: &dyn Task<C, Output = O>,
    stage_name: &str,
    input: &StageInput,
    ctx: &C,
) -> TaskRun<O>
where
    C: Send + Sync,
    O: Send + 'static,
{
    let started = Instant::now();
    let task_name = task.name().to_string();
    input.render(RenderEvent::TaskStart {
        session_id: input.session_id.clone(),
        step: input.step,
        task: task_name.clone(),
    });

    let mut retry = task.retry();
    if let Some(renderer) = input.renderer.clone() {
        let inner = retry.on_retry.take();
        let session_id = input.session_id.clone();
        let step = input.step;
        let task = task_name.clone();
        retry = retry.on_retry(move |err, attempt| {
            if let Some(inner) = &inner {
                inner(err, attempt);
            }
            renderer.render(&RenderEvent::TaskRetry {
                session_id: session_id.clone(),
                step,
                task: task.clone(),
                attempt,
                error: err.to_string(),
            });
        });
    }

    let timeout = task.timeout();
    let last_attempt = AtomicU32::new(0);
    let base_input = TaskInput {
        session_id: input.session_id.clone(),
        step: input.step,
        stage_name: stage_name.to_string(),
        task_name: task_name.clone(),
        attempt: 0,
    };

    let attempts = execute_with_retry(
        |attempt| {
            last_attempt.store(attempt, Ordering::SeqCst);
            let task_input = TaskInput {
                attempt,
                ..base_input.clone()
            };
            async move { invoke_once(task, &task_input, ctx, timeout).await }
        },
        &retry,
    );

    let settled = AssertUnwindSafe(attempts).catch_unwind().await;
    let attempts = last_attempt.load(Ordering::SeqCst).max(1);

    let (outcome, metadata) = match settled {
        Ok(Ok(result)) => {
            let metadata = result.metadata.clone();
            match result.into_result() {
                Ok(data) => (TaskOutcome::Succeeded(data), metadata),
                Err(err) => (TaskOutcome::Failed(err), metadata),
            }
        }
        Ok(Err(exhausted)) => (
            TaskOutcome::Failed(exhausted.last_error.to_string()),
            HashMap::new(),
        ),
        Err(panic) => (TaskOutcome::Panicked(panic_message(panic.as_ref())), HashMap::new()),
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    let required = task.criticality() == Criticality::Required;
    let default = match &outcome {
        TaskOutcome::Failed(_) if !required => task.default_output(),
        _ => None,
    };
    let status = settled_status(&outcome, required, default.is_some());
    let error = match &outcome {
        TaskOutcome::Succeeded(_) => None,
        TaskOutcome::Failed(e) | TaskOutcome::Panicked(e) => Some(e.clone()),
    };
    tracing::debug!(task = %task_name, ?status, attempts, duration_ms, "task settled");

    input.render(RenderEvent::TaskComplete {
        session_id: input.session_id.clone(),
        step: input.step,
        summary: TaskSummary {
            task: task_name,
            required,
            status,
            attempts,
            duration_ms,
            error,
            metadata: metadata.clone(),
        },
    });

    TaskRun {
        outcome,
        status,
        default,
        attempts,
        duration_ms,
        metadata,
    }
}

async fn invoke_once<C, O>(
    task: &dyn Task<C, Output = O>,
    input: &TaskInput,
    ctx: &C,
    timeout: Option<Duration>,
) -> Result<super::types::TaskResult<O>, TaskError>
where
    C: Send + Sync,
    O: Send + 'static,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, task.invoke(input, ctx))
            .await
            .map_err(|_| TaskError::Timeout(limit))?,
        None => task.invoke(input, ctx).await,
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::traits::FnTask;
    use crate::executor::types::TaskResult;
    use crate::retry::RetryOptions;
    use std::sync::Mutex;

    type Ctx = Vec<String>;

    fn append(ctx: Ctx, outputs: StageOutputs<String>) -> Result<Ctx, PipelineError> {
        let mut ctx = ctx;
        ctx.extend(outputs.into_values());
        Ok(ctx)
    }

    fn ok_task(name: &'static str, ms: u64) -> FnTask<Ctx, String> {
        FnTask::required(name, move |_, _| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(TaskResult::ok(name.to_string()))
        })
    }

    #[tokio::test]
    async fn fan_out_merges_in_declaration_order() {
        let stage = StageSpec::new("fan", append)
            .task(ok_task("slow", 20))
            .task(ok_task("fast", 1));

        let report = run_stage(&stage, &StageInput::new("s", 1), vec![]).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.context, vec!["slow".to_string(), "fast".to_string()]);
        assert_eq!(report.tasks.len(), 2);
    }

    #[tokio::test]
    async fn optional_failure_uses_default() {
        let stage = StageSpec::new("fan", append)
            .task(ok_task("a", 1))
            .task(FnTask::optional(
                "b",
                Some("fallback".to_string()),
                |_, _| async { Ok(TaskResult::failure("renderer offline")) },
            ));

        let report = run_stage(&stage, &StageInput::new("s", 1), vec![]).await.unwrap();
        assert_eq!(report.context, vec!["a".to_string(), "fallback".to_string()]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("renderer offline"));
        assert_eq!(report.tasks[1].status, TaskStatus::Defaulted);
    }

    #[derive(Default)]
    struct SummaryLog(Mutex<Vec<TaskSummary>>);

    impl RunRenderer for SummaryLog {
        fn name(&self) -> &str {
            "summary-log"
        }

        fn format(&self) -> &str {
            "test"
        }

        fn render(&self, event: &RenderEvent) {
            if let RenderEvent::TaskComplete { summary, .. } = event {
                self.0.lock().unwrap().push(summary.clone());
            }
        }
    }

    #[tokio::test]
    async fn rendered_task_status_matches_report() {
        let stage = StageSpec::new("fan", append)
            .task(ok_task("a", 1))
            .task(FnTask::optional(
                "b",
                Some("fallback".to_string()),
                |_, _| async { Ok(TaskResult::failure("renderer offline")) },
            ))
            .task(FnTask::optional("c", None, |_, _| async {
                Err(TaskError::fatal("bad input"))
            }));
        let log = Arc::new(SummaryLog::default());
        let mut input = StageInput::new("s", 1);
        input.renderer = Some(log.clone());

        let report = run_stage(&stage, &input, vec![]).await.unwrap();
        let mut rendered = log.0.lock().unwrap().clone();
        rendered.sort_by(|a, b| a.task.cmp(&b.task));

        let statuses: Vec<_> = rendered.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Succeeded, TaskStatus::Defaulted, TaskStatus::Failed]
        );
        assert_eq!(
            statuses,
            report.tasks.iter().map(|s| s.status).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn optional_without_default_is_omitted() {
        let stage = StageSpec::new("fan", append)
            .task(ok_task("a", 1))
            .task(FnTask::optional("b", None, |_, _| async {
                Err(TaskError::fatal("bad input"))
            }));

        let report = run_stage(&stage, &StageInput::new("s", 1), vec![]).await.unwrap();
        assert_eq!(report.context, vec!["a".to_string()]);
        assert!(report.warnings[0].contains("output omitted"));
    }

    #[tokio::test]
    async fn required_failure_skips_aggregation_but_settles_siblings() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let log = finished.clone();
        let stage = StageSpec::new("fan", append)
            .task(FnTask::required("boom", |_, _| async {
                Err(TaskError::fatal("first"))
            }))
            .task(FnTask::required("also-boom", |_, _| async {
                Ok(TaskResult::failure("second"))
            }))
            .task(FnTask::required("slow", move |_, _| {
                let log = log.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    log.lock().unwrap().push("slow");
                    Ok(TaskResult::ok("slow".to_string()))
                }
            }));

        let report = run_stage(&stage, &StageInput::new("s", 1), vec!["seed".into()])
            .await
            .unwrap();
        let failure = report.critical_failure.unwrap();
        assert_eq!(failure.task, "boom");
        assert_eq!(failure.error, "fatal failure: first");
        assert_eq!(report.context, vec!["seed".to_string()]);
        assert_eq!(*finished.lock().unwrap(), vec!["slow"]);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_per_task() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let stage = StageSpec::new("single", append).task(
            FnTask::required("flaky", move |input: TaskInput, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if input.attempt < 3 {
                        Err(TaskError::transient("503"))
                    } else {
                        Ok(TaskResult::ok(format!("attempt {}", input.attempt)))
                    }
                }
            })
            .with_retry(RetryOptions::new(3, 1)),
        );

        let report = run_stage(&stage, &StageInput::new("s", 1), vec![]).await.unwrap();
        assert_eq!(report.context, vec!["attempt 3".to_string()]);
        assert_eq!(report.tasks[0].attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_result_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let stage = StageSpec::new("single", append).task(
            FnTask::required("no", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(TaskResult::<String>::failure("rejected")) }
            })
            .with_retry(RetryOptions::new(5, 1)),
        );

        let report = run_stage(&stage, &StageInput::new("s", 1), vec![]).await.unwrap();
        assert!(report.critical_failure.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn per_attempt_timeout() {
        let stage = StageSpec::new("single", append).task(
            FnTask::required("hang", |_, _| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(TaskResult::ok("late".to_string()))
            })
            .with_timeout(Duration::from_millis(10)),
        );

        let report = run_stage(&stage, &StageInput::new("s", 1), vec![]).await.unwrap();
        assert_eq!(report.critical_failure.unwrap().error, "timed out after 10ms");
    }

    #[tokio::test]
    async fn panicking_task_is_internal_error() {
        let stage = StageSpec::new("fan", append)
            .task(ok_task("fine", 1))
            .task(FnTask::required("bad", |_, _| async {
                if true {
                    panic!("index out of bounds");
                }
                Ok(TaskResult::ok(String::new()))
            }));

        let err = run_stage(&stage, &StageInput::new("s", 1), vec![]).await.unwrap_err();
        assert!(matches!(err.error, PipelineError::Internal(ref msg) if msg.contains("index out of bounds")));
    }

    #[tokio::test]
    async fn aggregator_error_keeps_optional_warnings() {
        let stage = StageSpec::new("fan", |_: Ctx, _: StageOutputs<String>| -> Result<Ctx, PipelineError> {
            Err(PipelineError::internal("merge conflict"))
        })
        .task(ok_task("a", 1))
        .task(FnTask::optional(
            "b",
            Some("fallback".to_string()),
            |_, _| async { Ok(TaskResult::failure("renderer offline")) },
        ));

        let err = run_stage(&stage, &StageInput::new("s", 1), vec![]).await.unwrap_err();
        assert!(matches!(err.error, PipelineError::Internal(ref msg) if msg == "merge conflict"));
        assert_eq!(err.warnings.len(), 1);
        assert!(err.warnings[0].contains("renderer offline"));
    }
}
