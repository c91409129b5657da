//! Bounded-concurrency map over independent async jobs

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Run `f` over every item with at most `max_concurrency` calls in flight
///
/// Output slot `i` holds the result for `items[i]` whatever order the jobs
/// finish in. A failing item fills its own slot with the error and does not
/// stop the batch. `max_concurrency == 0` is rejected up front.
///
/// # Example
/// ```no_run
/// # async fn demo() -> volmeta::Result<()> {
/// let lens = volmeta::concurrent::map_concurrent(vec!["a", "bb"], 2, |s| async move {
///     Ok(s.len())
/// })
/// .await?;
/// assert_eq!(lens[1].as_ref().ok(), Some(&2));
/// # Ok(())
/// # }
/// ```
pub async fn map_concurrent<I, T, F, Fut>(
    items: Vec<I>,
    max_concurrency: usize,
    f: F,
) -> Result<Vec<Result<T>>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    if max_concurrency == 0 {
        return Err(Error::Validation(
            "maxConcurrency must be at least 1".to_string(),
        ));
    }

    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    let f = Arc::new(f);
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let f = Arc::clone(&f);

        handles.push(tokio::spawn(async move {
            // The callback is only invoked once a slot is held.
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| Error::Task(e.to_string()))?;
            f(item).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap_or_else(|e| Err(Error::from(e))));
    }
    Ok(results)
}
