//! Keyed bounded map: `(key, item)` pairs in, unordered `Vec<R>` out.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::dispatch::Dispatcher;
use crate::error::Errors;
use crate::options::{Options, remove_zero_values};

const ENGINE: &str = "map_keyed";

/// Apply `f` to every entry of a keyed collection with at most
/// `opts.concurrency` calls in flight.
///
/// Admission, cancellation, limit, and error rules are those of
/// [`map`](super::map()); failures are named by key. Results are appended as
/// tasks finish, so their order says nothing about which key produced them.
pub async fn map_keyed<K, T, R, E, F, Fut, I>(
    token: &CancellationToken,
    items: I,
    f: F,
    opts: Options,
) -> (Vec<R>, Errors)
where
    I: IntoIterator<Item = (K, T)>,
    K: fmt::Display + Send + 'static,
    T: Send + 'static,
    R: Default + PartialEq + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
    F: Fn(CancellationToken, K, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let entries: Vec<(K, T)> = items.into_iter().collect();
    let mut dispatch = Dispatcher::<(), R>::new(ENGINE, token, opts, entries.len());
    let span = dispatch.span().clone();
    let strip = dispatch.options().remove_zero_values;

    let f = Arc::new(f);

    async move {
        let mut results = Vec::new();

        for (key, item) in entries {
            let label = key.to_string();
            let Some(permit) = dispatch.admit(&label).await else {
                break;
            };
            let f = Arc::clone(&f);
            let cancel = token.clone();
            dispatch.spawn(permit, (), label, async move {
                f(cancel, key, item).await.map_err(Into::<anyhow::Error>::into)
            });
        }

        let errors = dispatch
            .finish(|(), value, _| {
                results.push(value);
                Ok(())
            })
            .await;

        (remove_zero_values(strip, results), errors)
    }
    .instrument(span)
    .await
}
