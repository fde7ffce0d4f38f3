//! Concurrent fan-out with positional results.
//!
//! `limit: None` issues every call at once. `limit: Some(n)` keeps at most `n`
//! in flight. Either way `output[i]` belongs to `items[i]`, whatever order the
//! calls finish in, and the first error fails the whole batch (outstanding
//! calls are dropped).

use std::future::Future;

use futures::future::{join_all, try_join_all};
use futures::stream::{self, StreamExt, TryStreamExt};

/// Map `f` over `items` concurrently; all-or-nothing.
pub async fn map_async<T, R, E, F, Fut>(
    items: impl IntoIterator<Item = T>,
    limit: Option<usize>,
    f: F,
) -> Result<Vec<R>, E>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let calls = items.into_iter().map(f);
    match limit {
        None => try_join_all(calls).await,
        Some(n) => {
            stream::iter(calls)
                .buffered(n.max(1))
                .try_collect()
                .await
        }
    }
}

/// Infallible variant of [`map_async`].
pub async fn map_all<T, R, F, Fut>(
    items: impl IntoIterator<Item = T>,
    limit: Option<usize>,
    f: F,
) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let calls = items.into_iter().map(f);
    match limit {
        None => join_all(calls).await,
        Some(n) => stream::iter(calls).buffered(n.max(1)).collect().await,
    }
}
