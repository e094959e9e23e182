//! helm: event-driven agent execution engine.
//!
//! Drives a conversational model through turns of streamed generation and
//! sequential tool execution, accepts steering and follow-up messages while a
//! run is in flight, and emits a strictly ordered [`AgentEvent`] stream.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use helm::prelude::*;
//!
//! # async fn example() -> helm::error::Result<()> {
//! let client = Arc::new(ScriptedClient::new([ScriptedTurn::text("Hi there!")]));
//! let agent = Agent::new(client, AgentConfig::from_env()?);
//! agent.subscribe(|event| println!("{}", event.kind()));
//! let result = agent.prompt("Hello!").await?;
//! assert!(result.is_completed());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod stream;
pub mod tools;
pub mod types;

pub use agent::Agent;
pub use agent_loop::AgentEvent;
pub use error::{HelmError, Result};
