//! Metric instruments for the engines.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`; all
//! instruments come from the `"fanmap"` meter and are no-ops until a provider
//! is installed. Every instrument carries an `engine` label
//! (`"map"` | `"map_keyed"` | `"execute"`).

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

use super::COMPONENT;

fn meter() -> Meter {
    opentelemetry::global::meter(COMPONENT)
}

/// Counter: units of work handed to a task.
pub fn items_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("fanmap.items.dispatched")
        .with_description("Units of work dispatched")
        .build()
}

/// Counter: units of work whose function returned an error or panicked.
pub fn items_failed() -> Counter<u64> {
    meter()
        .u64_counter("fanmap.items.failed")
        .with_description("Units of work that failed")
        .build()
}

/// Counter: items never dispatched because the token fired.
pub fn items_refused() -> Counter<u64> {
    meter()
        .u64_counter("fanmap.items.refused")
        .with_description("Items refused admission after cancellation")
        .build()
}

/// Counter: results produced after the limit was reached and dropped.
pub fn results_discarded() -> Counter<u64> {
    meter()
        .u64_counter("fanmap.results.discarded")
        .with_description("Results discarded because the limit was reached")
        .build()
}

/// Histogram: wall time of one engine call in milliseconds.
pub fn run_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("fanmap.run.duration_ms")
        .with_description("Engine call duration in milliseconds")
        .with_unit("ms")
        .build()
}

pub(crate) fn engine_label(engine: &'static str) -> [KeyValue; 1] {
    [KeyValue::new("engine", engine)]
}
