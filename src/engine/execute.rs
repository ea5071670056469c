//! Unbounded execute: run heterogeneous operations concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug};
use uuid::Uuid;

use super::dispatch::panic_reason;
use crate::error::{Error, Errors};
use crate::telemetry::metrics;
use crate::telemetry::run::{record_run_outcome, start_run_span};

const ENGINE: &str = "execute";

/// A boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// One operation for [`execute`]. Receives a clone of the caller's token.
pub type ExecuteFn<T> = Box<dyn FnOnce(CancellationToken) -> BoxFuture<anyhow::Result<T>> + Send>;

/// Box an async closure as an [`ExecuteFn`].
pub fn thunk<T, E, F, Fut>(f: F) -> ExecuteFn<T>
where
    T: Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Box::new(move |token| -> BoxFuture<anyhow::Result<T>> {
        Box::pin(async move { f(token).await.map_err(Into::<anyhow::Error>::into) })
    })
}

/// The result of one operation, tagged with its position in the input.
#[derive(Debug)]
pub struct Outcome<T> {
    pub index: usize,
    pub output: Result<T, Error>,
}

/// Operations launched by [`execute_stream`], yielded as they complete.
///
/// The stream owns the running operations: dropping it aborts every one that
/// has not finished yet.
pub struct ExecuteStream<T> {
    tasks: JoinSet<anyhow::Result<T>>,
    positions: HashMap<Id, usize>,
}

impl<T> ExecuteStream<T>
where
    T: Send + 'static,
{
    /// Wait for the next operation to finish. `None` once all have reported.
    pub async fn next(&mut self) -> Option<Outcome<T>> {
        let outcome = match self.tasks.join_next_with_id().await? {
            Ok((id, output)) => Outcome {
                index: self.positions.remove(&id).unwrap_or_default(),
                output: output.map_err(Error::Operation),
            },
            Err(join_err) => {
                let index = self.positions.remove(&join_err.id()).unwrap_or_default();
                Outcome {
                    index,
                    output: Err(Error::Panicked {
                        item: format!("operation #{index}"),
                        reason: panic_reason(join_err),
                    }),
                }
            }
        };
        Some(outcome)
    }

    /// Operations still running or not yet reported.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<T> Drop for ExecuteStream<T> {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            debug!(pending = self.tasks.len(), "execute dropped, aborting operations");
        }
    }
}

/// Launch every operation at once and yield each outcome as it completes.
///
/// Must be called from within a tokio runtime.
pub fn execute_stream<T>(token: &CancellationToken, fns: Vec<ExecuteFn<T>>) -> ExecuteStream<T>
where
    T: Send + 'static,
{
    let mut tasks = JoinSet::new();
    let mut positions = HashMap::with_capacity(fns.len());

    for (index, op) in fns.into_iter().enumerate() {
        let handle = tasks.spawn(op(token.clone()).in_current_span());
        positions.insert(handle.id(), index);
    }

    ExecuteStream { tasks, positions }
}

/// Run every operation concurrently and collect successes and failures.
///
/// No concurrency bound and no ordering: both vectors are in completion order.
/// Cancellation is left to the operations themselves via the token they
/// receive. Dropping the returned future aborts the operations still
/// running.
///
/// # Example
///
/// ```rust
/// use fanmap::{execute, thunk};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let token = CancellationToken::new();
/// let (mut out, errs) = execute(
///     &token,
///     vec![
///         thunk(|_| async { Ok::<_, std::io::Error>(1) }),
///         thunk(|_| async { Ok::<_, std::io::Error>(2) }),
///     ],
/// )
/// .await;
///
/// out.sort();
/// assert_eq!(out, vec![1, 2]);
/// assert!(errs.is_empty());
/// # }
/// ```
pub async fn execute<T>(token: &CancellationToken, fns: Vec<ExecuteFn<T>>) -> (Vec<T>, Errors)
where
    T: Send + 'static,
{
    let span = start_run_span(ENGINE, &Uuid::new_v4(), fns.len(), fns.len());
    let labels = metrics::engine_label(ENGINE);
    let started = Instant::now();

    async move {
        metrics::items_dispatched().add(fns.len() as u64, &labels);
        let mut stream = execute_stream(token, fns);

        let mut results = Vec::new();
        let mut errors = Errors::new();
        while let Some(outcome) = stream.next().await {
            match outcome.output {
                Ok(value) => results.push(value),
                Err(err) => {
                    debug!(index = outcome.index, error = %err, "operation failed");
                    metrics::items_failed().add(1, &labels);
                    errors.push(err);
                }
            }
        }

        metrics::run_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &labels);
        record_run_outcome(&tracing::Span::current(), results.len(), errors.len());
        (results, errors)
    }
    .instrument(span)
    .await
}
