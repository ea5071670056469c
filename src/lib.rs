//! # fanmap
//!
//! Bounded fan-out/fan-in over tokio.
//!
//! - [`map`] applies a fallible async function to an ordered `Vec`, keeping
//!   results in input order, with at most `concurrency` calls in flight.
//! - [`map_keyed`] does the same over a keyed collection; result order is
//!   unspecified.
//! - [`execute`] runs a heterogeneous list of operations all at once.
//!
//! Every engine returns whatever results it produced together with an
//! [`Errors`] aggregate; nothing is retried and one failure never stops the
//! rest. A [`CancellationToken`](tokio_util::sync::CancellationToken) stops new
//! dispatch; work already running is left to observe the token itself.

pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod options;
pub mod telemetry;

pub use engine::{BoxFuture, ExecuteFn, ExecuteStream, Outcome, execute, execute_stream, map, map_keyed, thunk};
pub use error::{Error, Errors};
pub use options::{Jitter, Options, Override, remove_zero_values, remove_zero_values_by};
