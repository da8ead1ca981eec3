#[allow(clippy::module_inception)]
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod task;

pub use error::CliError;
pub use pipeline::{PipelineError, StageError};
pub use progress::{ProgressError, TransitionError};
pub use task::{RetryExhaustedError, Retryable, TaskError};
