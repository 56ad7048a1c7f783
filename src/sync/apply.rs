//! Bounded-concurrency application of work items.

use std::future::Future;

use futures_util::stream::{self, StreamExt, TryStreamExt};

/// Run `f` over `items` with at most `limit` futures in flight.
///
/// Stops at the first error; futures still in flight are dropped.
pub async fn for_each_bounded<I, F, Fut, E>(items: I, limit: usize, f: F) -> Result<(), E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let futs: Vec<Fut> = items.into_iter().map(f).collect();
    let mut results = stream::iter(futs).buffer_unordered(limit.max(1));
    while let Some(result) = results.next().await {
        result?;
    }
    Ok(())
}

/// Like [`for_each_bounded`], collecting outputs in completion order.
pub async fn map_bounded<I, F, Fut, T, E>(items: I, limit: usize, f: F) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let futs: Vec<Fut> = items.into_iter().map(f).collect();
    stream::iter(futs)
        .buffer_unordered(limit.max(1))
        .try_collect()
        .await
}
