//! Agent loop primitives (runs, events, queues).

pub mod events;
pub mod queue;
pub mod runner;
pub mod types;

pub use events::*;
pub use queue::*;
pub use runner::*;
pub use types::*;
