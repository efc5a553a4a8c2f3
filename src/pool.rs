//! Bounded, order-restoring concurrent execution.
//!
//! Work items carry their original index. Up to `limit` of them run at once
//! (`try_buffer_unordered`), results come back in completion order tagged
//! with that index, and are sorted before being returned. Callers therefore
//! get deterministic output order no matter which call finished first.
//!
//! The first error stops the run: outstanding futures are dropped and the
//! error is returned, with no partial results.

use futures::stream::{self, Stream, TryStreamExt};
use std::future::Future;

/// Run `f` over an indexed, fallible stream with at most `limit` calls in
/// flight, returning results sorted by index.
///
/// The stream is pulled lazily, only when a slot is free, so an expensive
/// producer (e.g. a page rasteriser) never runs far ahead of the consumers.
pub async fn map_ordered<S, T, R, E, F, Fut>(work: S, limit: usize, mut f: F) -> Result<Vec<R>, E>
where
    S: Stream<Item = Result<(usize, T), E>>,
    F: FnMut(usize, T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let mut tagged: Vec<(usize, R)> = work
        .map_ok(|(index, item)| {
            let call = f(index, item);
            async move { call.await.map(|r| (index, r)) }
        })
        .try_buffer_unordered(limit.max(1))
        .try_collect()
        .await?;

    tagged.sort_by_key(|(index, _)| *index);
    Ok(tagged.into_iter().map(|(_, r)| r).collect())
}

/// Convenience form of [`map_ordered`] for an in-memory batch.
pub async fn run_bounded<T, R, E, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Result<Vec<R>, E>
where
    F: FnMut(usize, T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    map_ordered(stream::iter(items.into_iter().enumerate().map(Ok)), limit, f).await
}
