//! Bounded concurrent fan-out with a join barrier.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Run `job` for every item, at most `concurrency` at a time.
///
/// Each job fills only its own slot; results come back in input order once
/// every job has finished.
pub async fn fan_out<T, R, F, Fut>(items: Vec<T>, concurrency: usize, job: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();

    let mut results = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = job(item);
            async move { (index, fut.await) }
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((index, result)) = results.next().await {
        slots[index] = Some(result);
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let items: Vec<u64> = (1..=8).collect();

        let results = fan_out(items, 3, |n| async move {
            // Later items finish first.
            tokio::time::sleep(Duration::from_millis(20 - 2 * n)).await;
            n * n
        })
        .await;

        assert_eq!(results, vec![1, 4, 9, 16, 25, 36, 49, 64]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results = fan_out((0..10).collect::<Vec<_>>(), 2, |i| {
            let running = &running;
            let peak = &peak;
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        assert_eq!(results.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results: Vec<u32> = fan_out(Vec::<u32>::new(), 4, |n| async move { n }).await;
        assert!(results.is_empty());
    }
}
