//! Engine run span helpers.

use tracing::Span;
use uuid::Uuid;

/// Start the span wrapping one engine call.
///
/// `run.outcome` is declared empty and filled by [`record_run_outcome`].
pub fn start_run_span(engine: &str, run_id: &Uuid, items: usize, concurrency: usize) -> Span {
    tracing::info_span!(
        "fanmap.run",
        "run.engine" = engine,
        "run.id" = %run_id,
        "run.items" = items,
        "run.concurrency" = concurrency,
        "run.outcome" = tracing::field::Empty,
    )
}

/// Record the tallies of a finished run on its span and emit a summary event.
pub fn record_run_outcome(span: &Span, results: usize, errors: usize) {
    let outcome = if errors == 0 { "ok" } else { "partial" };
    span.record("run.outcome", outcome);
    span.in_scope(|| {
        tracing::debug!(results, errors, "run finished");
    });
}
