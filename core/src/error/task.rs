use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failure raised by a task invocation.
///
/// Only [`TaskError::Transient`] is retried by the task wrapper; fatal errors
/// and timeouts end the task on the attempt that produced them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal failure: {0}")]
    Fatal(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl TaskError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}

/// Classifies whether an error is worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for TaskError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl Retryable for anyhow::Error {}

impl Retryable for std::io::Error {}

/// Returned by the task wrapper once it stops retrying.
///
/// `last_error` is the error produced by the final attempt.
#[derive(Debug, Clone)]
pub struct RetryExhaustedError<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E> RetryExhaustedError<E> {
    pub fn into_inner(self) -> E {
        self.last_error
    }
}

impl<E: fmt::Display> fmt::Display for RetryExhaustedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up after {} attempt(s): {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryExhaustedError<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(TaskError::transient("503").is_retryable());
        assert!(!TaskError::fatal("bad request").is_retryable());
        assert!(!TaskError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn exhausted_error_mentions_attempts() {
        let err = RetryExhaustedError {
            attempts: 3,
            last_error: TaskError::transient("connection reset"),
        };
        assert_eq!(
            err.to_string(),
            "gave up after 3 attempt(s): transient failure: connection reset"
        );
        assert_eq!(err.into_inner(), TaskError::transient("connection reset"));
    }
}
