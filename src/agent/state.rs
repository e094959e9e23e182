//! Observable agent state.

use std::collections::HashSet;
use std::sync::Arc;

use crate::agent::message::AgentMessage;
use crate::agent_loop::AgentEvent;
use crate::tools::ToolRegistry;
use crate::types::ThinkingLevel;

/// Snapshot of everything an observer can see about an [`Agent`](super::Agent).
///
/// The loop mutates it only through emitted events (see [`AgentState::apply`]);
/// callers mutate it through the agent's setters between runs.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub system_prompt: Option<String>,
    pub model: String,
    pub thinking_level: ThinkingLevel,
    /// Shared read-only with the loop for the duration of a run.
    pub tools: Arc<ToolRegistry>,
    /// Conversation log.
    pub messages: Vec<AgentMessage>,
    pub is_streaming: bool,
    /// In-flight message between `message_start` and `message_end`.
    pub stream_message: Option<AgentMessage>,
    /// Tool call ids between `tool_execution_start` and `tool_execution_end`.
    pub pending_tool_calls: HashSet<String>,
    /// Last run failure.
    pub error: Option<String>,
}

impl AgentState {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            model: model.into(),
            thinking_level: ThinkingLevel::Off,
            tools: Arc::new(ToolRegistry::new()),
            messages: Vec::new(),
            is_streaming: false,
            stream_message: None,
            pending_tool_calls: HashSet::new(),
            error: None,
        }
    }

    /// Fold one loop event into the state.
    pub fn apply(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::MessageStart { message } | AgentEvent::MessageUpdate { message, .. } => {
                self.stream_message = Some(message.clone());
            }
            AgentEvent::MessageEnd { message } => {
                self.stream_message = None;
                self.messages.push(message.clone());
            }
            AgentEvent::ToolExecutionStart { tool_call_id, .. } => {
                self.pending_tool_calls.insert(tool_call_id.clone());
            }
            AgentEvent::ToolExecutionEnd { tool_call_id, .. } => {
                self.pending_tool_calls.remove(tool_call_id);
            }
            AgentEvent::TurnEnd { message, .. } => {
                if let Some(error) = message
                    .as_assistant()
                    .and_then(|assistant| assistant.error_message.as_ref())
                {
                    self.error = Some(error.clone());
                }
            }
            AgentEvent::AgentEnd { .. } => {
                self.is_streaming = false;
                self.stream_message = None;
            }
            AgentEvent::AgentStart { .. }
            | AgentEvent::TurnStart { .. }
            | AgentEvent::ToolExecutionUpdate { .. } => {}
        }
    }

    /// Drop the conversation and every run-scoped field. Configuration stays.
    pub(crate) fn clear_run_state(&mut self) {
        self.messages.clear();
        self.is_streaming = false;
        self.stream_message = None;
        self.pending_tool_calls.clear();
        self.error = None;
    }
}
