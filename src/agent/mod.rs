//! Stateful agent: conversation log, queues, subscribers, single active run.

pub mod message;
pub mod runtime;
pub mod state;

pub use message::{convert_to_llm, AgentMessage};
pub use runtime::{Agent, AgentListener, ListenerId};
pub use state::AgentState;
