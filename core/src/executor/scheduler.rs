use std::future::Future;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

/// Drive every future to completion and return their outputs in input order.
///
/// At most `max_parallel` futures make progress at once (0 means no cap).
/// Nothing is cancelled when one of them fails: callers get every outcome.
pub async fn settle_all<T, Fut>(futures: Vec<Fut>, max_parallel: usize) -> Vec<T>
where
    Fut: Future<Output = T>,
{
    let total = futures.len();
    let limit = if max_parallel == 0 {
        total.max(1)
    } else {
        max_parallel
    };
    let sem = Semaphore::new(limit);
    let sem = &sem;

    let mut pending: FuturesUnordered<_> = futures
        .into_iter()
        .enumerate()
        .map(|(idx, fut)| async move {
            // the semaphore is never closed, so acquire only fails if it were
            let _permit = sem.acquire().await.ok();
            (idx, fut.await)
        })
        .collect();

    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    while let Some((idx, out)) = pending.next().await {
        slots[idx] = Some(out);
    }

    slots.into_iter().flatten().collect()
}
