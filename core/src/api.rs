//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `artiflow_core::api` instead of reaching into internal modules.

pub use crate::config::{
    get_artiflow_data_dir, load_default, load_from_path, AppConfig, ExecutorConfig,
    HttpServerConfig, LoggingConfig, OutputConfig, ProgressBackend, ProgressConfig, RetryConfig,
};
pub use crate::context::AppContext;
pub use crate::error::{
    CliError, PipelineError, ProgressError, RetryExhaustedError, Retryable, StageError, TaskError,
    TransitionError,
};
pub use crate::executor::{
    run_stage, settle_all, Criticality, FnTask, ProgressMonitor, RenderEvent, RunRenderer, Stage,
    StageInput, StageOutputs, StageReport, StageSpec, Task, TaskFailure, TaskInput, TaskResult,
    TaskStatus, TaskSummary,
};
pub use crate::orchestrator::{FailureKind, Orchestrator, Pipeline, RunOutcome, RunRegistry};
pub use crate::retry::{execute_with_retry, poll_until, PollStatus, RetryOptions};
pub use crate::state::{
    ProgressEvent, ProgressManager, ProgressStore, ProgressView, Session, SessionStatus,
    SnapshotStore, Step, StepStatus, StepView, validate_session_id,
};
