mod report;
mod result;
mod task;

pub use report::{StageOutputs, StageReport};
pub use result::TaskResult;
pub use task::{Criticality, TaskFailure, TaskInput, TaskStatus, TaskSummary};
