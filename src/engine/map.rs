//! Ordered bounded map: `Vec<T>` in, `Vec<R>` out, slot `i` for item `i`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::dispatch::Dispatcher;
use crate::error::{Error, Errors};
use crate::options::{Options, remove_zero_values};

const ENGINE: &str = "map";

/// Apply `f` to every item with at most `opts.concurrency` calls in flight and
/// collect the results in input order.
///
/// Every slot starts as `R::default()`; a successful call overwrites slot `i`
/// with its value, a failed call leaves it untouched and records an
/// [`Error::Item`]. Dispatch stops early when the limit is reached or `token`
/// fires, but work already dispatched always runs to completion and lands in
/// its slot. `f` receives a clone of `token` and may observe it to stop early.
/// `f` itself is called inside the spawned task, so its synchronous prelude
/// runs behind the gate and a panic there is reported like any other.
///
/// With `remove_zero_values` set (the default) default-valued slots are
/// stripped before returning, so positions no longer line up with the input
/// once anything failed or was skipped. Disable it to keep the one-to-one
/// correspondence.
///
/// # Example
///
/// ```rust
/// use fanmap::{Options, map};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let token = CancellationToken::new();
/// let (doubled, errs) = map(
///     &token,
///     vec![1, 2, 3, 4, 5],
///     |_, x: i32| async move { Ok::<_, std::io::Error>(x * 2) },
///     Options::default(),
/// )
/// .await;
///
/// assert!(errs.is_empty());
/// assert_eq!(doubled, vec![2, 4, 6, 8, 10]);
/// # }
/// ```
pub async fn map<T, R, E, F, Fut>(
    token: &CancellationToken,
    items: Vec<T>,
    f: F,
    opts: Options,
) -> (Vec<R>, Errors)
where
    T: fmt::Display + Send + 'static,
    R: Default + PartialEq + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
    F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let mut dispatch = Dispatcher::<usize, R>::new(ENGINE, token, opts, items.len());
    let span = dispatch.span().clone();
    let strip = dispatch.options().remove_zero_values;

    let f = Arc::new(f);

    async move {
        let mut results: Vec<R> = std::iter::repeat_with(R::default)
            .take(items.len())
            .collect();

        for (index, item) in items.into_iter().enumerate() {
            let label = item.to_string();
            let Some(permit) = dispatch.admit(&label).await else {
                break;
            };
            let f = Arc::clone(&f);
            let cancel = token.clone();
            dispatch.spawn(permit, index, label, async move {
                f(cancel, item).await.map_err(Into::<anyhow::Error>::into)
            });
        }

        let errors = dispatch
            .finish(|index, value, label| match results.get_mut(index) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(Error::IndexOutOfRange {
                    item: label.to_string(),
                    index,
                }),
            })
            .await;

        (remove_zero_values(strip, results), errors)
    }
    .instrument(span)
    .await
}
