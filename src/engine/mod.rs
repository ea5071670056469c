//! Fan-out/fan-in engines: ordered map, keyed map, and execute.

mod dispatch;
pub mod execute;
pub mod keyed;
pub mod map;

pub use execute::{BoxFuture, ExecuteFn, ExecuteStream, Outcome, execute, execute_stream, thunk};
pub use keyed::map_keyed;
pub use map::map;
