//! Engine options and zero-value post-processing.
//!
//! `Options` is resolved from its defaults by folding a list of [`Override`]s.
//! Each override consumes the current value and returns a modified copy, so a
//! resolved `Options` is never shared or mutated behind the caller's back.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::warn;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for one engine call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Admission gate capacity. Always at least 1.
    pub concurrency: usize,

    /// Maximum number of results to record. 0 means unbounded.
    pub limit: usize,

    /// Strip default-valued entries from the output before returning.
    pub remove_zero_values: bool,

    /// Random delay inserted before each dispatch.
    pub jitter: Option<Jitter>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            concurrency: available_parallelism(),
            limit: 0,
            remove_zero_values: true,
            jitter: None,
        }
    }
}

/// A single functional override over [`Options`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Override {
    Concurrency(usize),
    Limit(usize),
    RemoveZeroValues(bool),
    Jitter(Jitter),
}

impl Options {
    /// Fold `overrides` over the defaults, in order.
    pub fn resolve<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = Override>,
    {
        overrides.into_iter().fold(Self::default(), Self::with)
    }

    /// Apply one override, returning the modified copy.
    pub fn with(mut self, o: Override) -> Self {
        match o {
            Override::Concurrency(n) => {
                if n == 0 {
                    warn!("concurrency of 0 is invalid, clamping to 1");
                }
                self.concurrency = n.max(1);
            }
            Override::Limit(n) => self.limit = n,
            Override::RemoveZeroValues(remove) => self.remove_zero_values = remove,
            Override::Jitter(j) => self.jitter = Some(j.normalized()),
        }
        self
    }

    pub fn concurrency(self, n: usize) -> Self {
        self.with(Override::Concurrency(n))
    }

    pub fn limit(self, n: usize) -> Self {
        self.with(Override::Limit(n))
    }

    pub fn remove_zero_values(self, remove: bool) -> Self {
        self.with(Override::RemoveZeroValues(remove))
    }

    pub fn jitter(self, min: u64, max: u64, unit: Duration) -> Self {
        self.with(Override::Jitter(Jitter::new(min, max, unit)))
    }

    /// Re-apply the invariants a deserialized value may have skipped.
    pub(crate) fn sanitized(mut self) -> Self {
        let n = self.concurrency;
        let jitter = self.jitter.take();
        self = self.concurrency(n);
        self.jitter = jitter.map(Jitter::normalized);
        self
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ---------------------------------------------------------------------------
// Jitter
// ---------------------------------------------------------------------------

/// Inclusive bounds `[min, max]`, scaled by `unit`, for the pre-dispatch delay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jitter {
    pub min: u64,
    pub max: u64,
    #[serde(rename = "unit_ms", with = "millis")]
    pub unit: Duration,
}

impl Jitter {
    pub fn new(min: u64, max: u64, unit: Duration) -> Self {
        Self { min, max, unit }.normalized()
    }

    fn normalized(self) -> Self {
        if self.min > self.max {
            warn!(min = self.min, max = self.max, "jitter bounds reversed, swapping");
            Self {
                min: self.max,
                max: self.min,
                unit: self.unit,
            }
        } else {
            self
        }
    }

    /// Draw one delay. Zero when the unit or both bounds are zero.
    pub fn sample(&self) -> Duration {
        if self.unit.is_zero() || self.max == 0 {
            return Duration::ZERO;
        }
        let n = rand::rng().random_range(self.min..=self.max);
        self.unit.saturating_mul(u32::try_from(n).unwrap_or(u32::MAX))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// Zero-value stripping
// ---------------------------------------------------------------------------

/// Drop every `R::default()` entry when `remove` is set. Survivors keep their
/// relative order.
pub fn remove_zero_values<R>(remove: bool, results: Vec<R>) -> Vec<R>
where
    R: Default + PartialEq,
{
    if !remove {
        return results;
    }
    let zero = R::default();
    remove_zero_values_by(results, |r| *r == zero)
}

/// Drop every entry for which `is_zero` holds.
pub fn remove_zero_values_by<R, F>(mut results: Vec<R>, is_zero: F) -> Vec<R>
where
    F: Fn(&R) -> bool,
{
    results.retain(|r| !is_zero(r));
    results
}
