//! Observer-facing agent events.

use serde::{Deserialize, Serialize};

use crate::agent::message::AgentMessage;
use crate::stream::{AssistantMessageEvent, EventStream, StreamEvent};
use crate::tools::AgentToolResult;
use crate::types::ToolResultMessage;

use super::types::{RunId, RunResult};

/// Events emitted by the agent loop, in strict order.
///
/// `agent_start` is always first and `agent_end` always last. Every
/// `message_start` is followed by exactly one `message_end` for the same
/// message before another message starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentStart {
        run_id: RunId,
    },
    /// All messages added during the run.
    AgentEnd {
        run_id: RunId,
        messages: Vec<AgentMessage>,
    },
    TurnStart {
        run_id: RunId,
        turn_index: usize,
    },
    TurnEnd {
        run_id: RunId,
        turn_index: usize,
        message: AgentMessage,
        tool_results: Vec<ToolResultMessage>,
    },
    MessageStart {
        message: AgentMessage,
    },
    /// Assistant streaming progress; `message` is the partial so far.
    MessageUpdate {
        message: AgentMessage,
        assistant_event: AssistantMessageEvent,
    },
    MessageEnd {
        message: AgentMessage,
    },
    ToolExecutionStart {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },
    ToolExecutionUpdate {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
        partial_result: AgentToolResult,
    },
    ToolExecutionEnd {
        tool_call_id: String,
        tool_name: String,
        result: AgentToolResult,
        is_error: bool,
    },
}

impl AgentEvent {
    /// Wire name of the event (`"turn_start"`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentStart { .. } => "agent_start",
            Self::AgentEnd { .. } => "agent_end",
            Self::TurnStart { .. } => "turn_start",
            Self::TurnEnd { .. } => "turn_end",
            Self::MessageStart { .. } => "message_start",
            Self::MessageUpdate { .. } => "message_update",
            Self::MessageEnd { .. } => "message_end",
            Self::ToolExecutionStart { .. } => "tool_execution_start",
            Self::ToolExecutionUpdate { .. } => "tool_execution_update",
            Self::ToolExecutionEnd { .. } => "tool_execution_end",
        }
    }
}

/// Agent event streams close through [`EventSink::end`](crate::stream::EventSink::end)
/// once the run result is known, right after `agent_end`.
impl StreamEvent for AgentEvent {
    type Output = RunResult;

    fn terminal_output(&self) -> Option<RunResult> {
        None
    }
}

/// Event stream for one run; resolves to the [`RunResult`].
pub type AgentEventStream = EventStream<AgentEvent>;
