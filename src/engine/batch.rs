//! Bounded fan-out
//!
//! Items are processed in sequential batches; each batch's futures run
//! concurrently and batch `b + 1` starts only after all of batch `b` settled.
//! Peak in-flight work is therefore at most `batch_size`.

use futures::future::join_all;
use std::future::Future;

/// Map `f` over `items` in batches, preserving input order in the output
pub async fn in_batches<T, R, F, Fut>(items: Vec<T>, batch_size: usize, mut f: F) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let batch: Vec<Fut> = items.by_ref().take(batch_size).map(&mut f).collect();
        results.extend(join_all(batch).await);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_in_flight_and_ordered() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = in_batches((0..23).collect(), 5, |i: u64| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                // Later items finish first within a batch
                tokio::time::sleep(Duration::from_millis(100 - i)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i * 2
            }
        })
        .await;

        assert_eq!(results, (0..23).map(|i| i * 2).collect::<Vec<_>>());
        assert_eq!(peak.load(Ordering::SeqCst), 5);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_and_zero_batch_size() {
        let empty: Vec<u32> = in_batches(Vec::<u32>::new(), 8, |i| async move { i }).await;
        assert!(empty.is_empty());

        let all = in_batches(vec![1, 2, 3], 0, |i| async move { i + 1 }).await;
        assert_eq!(all, vec![2, 3, 4]);
    }
}
