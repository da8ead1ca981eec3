use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Retryable, TaskError};

/// Observation of an external long-running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Pending,
    Ready(T),
    Failed(String),
}

/// Probe an external job every `interval` until it is ready, it reports a
/// failure, or `timeout` elapses.
///
/// Hitting the deadline is a terminal [`TaskError::Timeout`] for the caller;
/// the external job itself is left alone. Transient probe errors count as
/// `Pending` so a flaky status endpoint never makes the caller resubmit the
/// job; any other probe error propagates unchanged.
pub async fn poll_until<T, F, Fut>(
    mut probe: F,
    interval: Duration,
    timeout: Duration,
) -> Result<T, TaskError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>, TaskError>>,
{
    let deadline = Instant::now() + timeout;
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        match probe().await {
            Ok(PollStatus::Ready(value)) => return Ok(value),
            Ok(PollStatus::Failed(reason)) => return Err(TaskError::Fatal(reason)),
            Ok(PollStatus::Pending) => {}
            Err(err) if err.is_retryable() => {
                tracing::debug!(polls, error = %err, "job status probe failed, still waiting");
            }
            Err(err) => return Err(err),
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(polls, timeout_ms = timeout.as_millis() as u64, "job did not finish before deadline");
            return Err(TaskError::Timeout(timeout));
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn returns_when_job_becomes_ready() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let value = poll_until(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Ok(PollStatus::Pending)
                    } else {
                        Ok(PollStatus::Ready("done"))
                    }
                }
            },
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn deadline_is_a_timeout_failure() {
        let err = poll_until(
            || async { Ok::<PollStatus<()>, TaskError>(PollStatus::Pending) },
            Duration::from_millis(5),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();

        assert_eq!(err, TaskError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn transient_probe_errors_keep_waiting() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let value = poll_until(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    match n {
                        1 | 2 => Err(TaskError::transient("status endpoint returned 503")),
                        3 => Ok(PollStatus::Pending),
                        _ => Ok(PollStatus::Ready(7)),
                    }
                }
            },
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unreachable_status_endpoint_ends_at_deadline() {
        let err = poll_until(
            || async { Err::<PollStatus<()>, _>(TaskError::transient("503")) },
            Duration::from_millis(5),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();

        assert_eq!(err, TaskError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn fatal_probe_error_stops_polling() {
        let err = poll_until(
            || async { Err::<PollStatus<()>, _>(TaskError::fatal("404 unknown job")) },
            Duration::from_millis(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert_eq!(err, TaskError::fatal("404 unknown job"));
    }

    #[tokio::test]
    async fn reported_job_failure_is_fatal() {
        let err = poll_until(
            || async { Ok::<PollStatus<()>, TaskError>(PollStatus::Failed("render crashed".into())) },
            Duration::from_millis(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert_eq!(err, TaskError::fatal("render crashed"));
    }
}
