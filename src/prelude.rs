//! Convenience re-exports for common use.

pub use crate::agent::{Agent, AgentMessage, AgentState, ListenerId};
pub use crate::agent_loop::{
    agent_loop, agent_loop_continue, AgentEvent, AgentEventStream, LoopRunner, QueueMode,
    RunRequest, RunResult, RunStatus,
};
pub use crate::config::AgentConfig;
pub use crate::error::{HelmError, Result};
pub use crate::provider::{GenerationRequest, ModelClient, ScriptedClient, ScriptedTurn};
pub use crate::stream::{AssistantMessageEvent, EventStream};
pub use crate::tools::{AgentTool, AgentToolParameters, AgentToolResult, Tool, ToolArguments, ToolRegistry};
pub use crate::types::{
    AssistantMessage, GenerationOptions, Message, StopReason, ThinkingLevel, ToolResultMessage,
    Usage,
};
