use std::fmt;
use std::future::Future;

use crate::error::{RetryExhaustedError, Retryable};

use super::RetryOptions;

/// Run `f` until it succeeds, it fails with a non-retryable error, or
/// `opts.max_attempts` attempts have been made.
///
/// `f` receives the 1-based attempt number. Between attempts the wrapper logs a
/// warning, calls `opts.on_retry` and sleeps according to [`RetryOptions::delay_for`].
pub async fn execute_with_retry<T, E, F, Fut>(
    mut f: F,
    opts: &RetryOptions,
) -> Result<T, RetryExhaustedError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let max_attempts = opts.attempts();
    let mut attempt = 1;

    loop {
        match f(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= max_attempts || !err.is_retryable() {
                    return Err(RetryExhaustedError {
                        attempts: attempt,
                        last_error: err,
                    });
                }

                let delay = opts.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, retrying"
                );
                if let Some(hook) = &opts.on_retry {
                    hook(&err as &dyn fmt::Display, attempt);
                }

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn flaky(calls: Arc<AtomicU32>, failures: u32) -> impl FnMut(u32) -> futures::future::Ready<Result<u32, TaskError>> {
        move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                futures::future::ready(Err(TaskError::transient("network error")))
            } else {
                futures::future::ready(Ok(n))
            }
        }
    }

    #[tokio::test]
    async fn converges_after_k_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let opts = RetryOptions::new(3, 1);

        let value = execute_with_retry(flaky(calls.clone(), 2), &opts)
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_when_attempts_do_not_cover_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let opts = RetryOptions::new(2, 1).with_backoff(true);

        let err = execute_with_retry(flaky(calls.clone(), 2), &opts)
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert_eq!(err.last_error, TaskError::transient("network error"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let opts = RetryOptions::new(5, 1);

        let err = execute_with_retry(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TaskError::fatal("invalid api key")) }
            },
            &opts,
        )
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn on_retry_sees_every_failed_attempt() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let opts = RetryOptions::new(4, 1).on_retry(move |err, attempt| {
            sink.lock().unwrap().push(format!("{attempt}:{err}"));
        });

        let calls = Arc::new(AtomicU32::new(0));
        execute_with_retry(flaky(calls, 2), &opts).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "1:transient failure: network error".to_string(),
                "2:transient failure: network error".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn attempt_number_is_passed_through() {
        let opts = RetryOptions::new(3, 1);
        let attempts = execute_with_retry(
            |attempt| async move {
                if attempt < 3 {
                    Err(TaskError::transient("again"))
                } else {
                    Ok(attempt)
                }
            },
            &opts,
        )
        .await
        .unwrap();
        assert_eq!(attempts, 3);
    }
}
