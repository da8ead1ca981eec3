//! Bounded retry with backoff, and polling of external long-running jobs.

mod execute;
mod options;
mod poll;

pub use execute::execute_with_retry;
pub use options::{RetryHook, RetryOptions};
pub use poll::{poll_until, PollStatus};
