//! Stage executor
//!
//! Runs the tasks of one stage and folds their outputs into the pipeline
//! context.
//!
//! ```text
//! StageSpec { tasks, aggregate }
//!   ↓
//! run_stage()
//!   ├─ 1 task  → run_task()                    (retry + timeout + panic capture)
//!   └─ n tasks → settle_all(run_task() × n)    (wait for all, no cancellation)
//!   ↓
//! classify: required failure → critical_failure
//!           optional failure → warning + default output
//!   ↓
//! aggregate(ctx, StageOutputs) → StageReport { context, critical_failure, warnings, tasks }
//! ```

mod progress;
mod scheduler;
pub mod stage;
pub mod traits;
pub mod types;

pub use progress::ProgressMonitor;
pub use scheduler::settle_all;
pub use stage::{run_stage, Aggregator, StageInput, StageSpec};
pub(crate) use stage::panic_message;
pub use traits::{FnTask, RenderEvent, RunRenderer, Stage, Task};
pub use types::{
    Criticality, StageOutputs, StageReport, TaskFailure, TaskInput, TaskResult, TaskStatus,
    TaskSummary,
};
