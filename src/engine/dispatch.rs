//! Admission and fan-in shared by the bounded engines.
//!
//! A [`Dispatcher`] owns the gate, the join set of in-flight tasks, and the
//! error aggregate for one engine call. Engines feed it one item at a time via
//! [`Dispatcher::admit`] and [`Dispatcher::spawn`], then hand [`Dispatcher::finish`]
//! a closure that places each recorded value.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::OwnedSemaphorePermit;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, warn};
use uuid::Uuid;

use crate::error::{Error, Errors};
use crate::gate::AdmissionGate;
use crate::options::Options;
use crate::telemetry::metrics;
use crate::telemetry::run::{record_run_outcome, start_run_span};

/// What a finished task hands back. `Ok(None)` is a value produced after the
/// limit was reached.
struct Published<S, R> {
    slot: S,
    output: Result<Option<R>, anyhow::Error>,
}

pub(crate) struct Dispatcher<S, R> {
    engine: &'static str,
    token: CancellationToken,
    gate: AdmissionGate,
    opts: Options,
    recorded: Arc<AtomicUsize>,
    tasks: JoinSet<Published<S, R>>,
    labels: HashMap<Id, String>,
    errors: Errors,
    span: Span,
    started: Instant,
}

impl<S, R> Dispatcher<S, R>
where
    S: Send + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(
        engine: &'static str,
        token: &CancellationToken,
        opts: Options,
        items: usize,
    ) -> Self {
        let opts = opts.sanitized();
        let span = start_run_span(engine, &Uuid::new_v4(), items, opts.concurrency);
        Self {
            engine,
            token: token.clone(),
            gate: AdmissionGate::new(opts.concurrency),
            opts,
            recorded: Arc::new(AtomicUsize::new(0)),
            tasks: JoinSet::new(),
            labels: HashMap::new(),
            errors: Errors::new(),
            span,
            started: Instant::now(),
        }
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn options(&self) -> &Options {
        &self.opts
    }

    fn limit_reached(&self) -> bool {
        self.opts.limit > 0 && self.recorded.load(Ordering::Acquire) >= self.opts.limit
    }

    fn refuse(&mut self, err: Error) {
        warn!(error = %err, "dispatch refused");
        metrics::items_refused().add(1, &metrics::engine_label(self.engine));
        self.errors.push(err);
    }

    /// Run admission for the next item.
    ///
    /// `None` means stop dispatching; a refusal caused by the token has
    /// already been recorded against `label`.
    pub(crate) async fn admit(&mut self, label: &str) -> Option<OwnedSemaphorePermit> {
        if self.limit_reached() {
            debug!(limit = self.opts.limit, "limit reached, no further dispatch");
            return None;
        }

        if self.token.is_cancelled() {
            self.refuse(Error::CancelledBeforeDispatch {
                item: label.to_string(),
            });
            return None;
        }

        let Ok(permit) = self.gate.acquire(&self.token).await else {
            self.refuse(Error::AdmissionTimeout {
                item: label.to_string(),
            });
            return None;
        };

        // a slot may have freed up only because the limit was just hit
        if self.limit_reached() {
            debug!(limit = self.opts.limit, "limit reached, no further dispatch");
            return None;
        }

        if let Some(delay) = self.opts.jitter.as_ref().map(|j| j.sample())
            && !delay.is_zero()
        {
            let token = self.token.clone();
            let cancelled = tokio::select! {
                _ = token.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                drop(permit);
                self.refuse(Error::CancelledBeforeDispatch {
                    item: label.to_string(),
                });
                return None;
            }
        }

        Some(permit)
    }

    /// Spawn `work` holding `permit` until it finishes.
    pub(crate) fn spawn<F>(&mut self, permit: OwnedSemaphorePermit, slot: S, label: String, work: F)
    where
        F: Future<Output = Result<R, anyhow::Error>> + Send + 'static,
    {
        let recorded = Arc::clone(&self.recorded);
        let limit = self.opts.limit;

        let handle = self.tasks.spawn(
            async move {
                let output = work
                    .await
                    .map(|value| try_record(&recorded, limit).then_some(value));
                // released only after recording so the next admission sees the count
                drop(permit);
                Published { slot, output }
            }
            .instrument(self.span.clone()),
        );

        self.labels.insert(handle.id(), label);
        metrics::items_dispatched().add(1, &metrics::engine_label(self.engine));
    }

    /// Wait for every dispatched task, passing each recorded value to `place`,
    /// and return the collected errors.
    pub(crate) async fn finish<P>(mut self, mut place: P) -> Errors
    where
        P: FnMut(S, R, &str) -> Result<(), Error>,
    {
        let labels = metrics::engine_label(self.engine);

        while let Some(joined) = self.tasks.join_next_with_id().await {
            match joined {
                Ok((id, Published { slot, output })) => {
                    let label = self.labels.remove(&id).unwrap_or_default();
                    match output {
                        Ok(Some(value)) => {
                            if let Err(err) = place(slot, value, &label) {
                                metrics::items_failed().add(1, &labels);
                                self.errors.push(err);
                            }
                        }
                        Ok(None) => {
                            debug!(item = %label, "result discarded, limit reached");
                            metrics::results_discarded().add(1, &labels);
                        }
                        Err(source) => {
                            debug!(item = %label, error = %source, "item failed");
                            metrics::items_failed().add(1, &labels);
                            self.errors.push(Error::Item {
                                item: label,
                                source,
                            });
                        }
                    }
                }
                Err(join_err) => {
                    let label = self.labels.remove(&join_err.id()).unwrap_or_default();
                    let reason = panic_reason(join_err);
                    warn!(item = %label, %reason, "task panicked");
                    metrics::items_failed().add(1, &labels);
                    self.errors.push(Error::Panicked {
                        item: label,
                        reason,
                    });
                }
            }
        }

        metrics::run_duration_ms().record(self.started.elapsed().as_secs_f64() * 1000.0, &labels);
        record_run_outcome(
            &self.span,
            self.recorded.load(Ordering::Acquire),
            self.errors.len(),
        );
        self.errors
    }
}

/// Claim one of the `limit` result slots. Always succeeds when `limit` is 0.
fn try_record(recorded: &AtomicUsize, limit: usize) -> bool {
    recorded
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (limit == 0 || n < limit).then_some(n + 1)
        })
        .is_ok()
}

pub(crate) fn panic_reason(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_record_respects_limit() {
        let recorded = AtomicUsize::new(0);
        assert!(try_record(&recorded, 2));
        assert!(try_record(&recorded, 2));
        assert!(!try_record(&recorded, 2));
        assert_eq!(recorded.load(Ordering::Acquire), 2);
    }

    #[test]
    fn try_record_unbounded() {
        let recorded = AtomicUsize::new(0);
        for _ in 0..10 {
            assert!(try_record(&recorded, 0));
        }
        assert_eq!(recorded.load(Ordering::Acquire), 10);
    }
}
