use crate::agent::message::AgentMessage;

use super::control::AgentEventEmitter;
use super::AgentEvent;

pub(super) fn emit_message_lifecycle(agent_emitter: &AgentEventEmitter, message: &AgentMessage) {
    agent_emitter.emit(AgentEvent::MessageStart {
        message: message.clone(),
    });
    agent_emitter.emit(AgentEvent::MessageEnd {
        message: message.clone(),
    });
}

/// Run context plus the messages added since the run started.
pub(super) struct Transcript {
    context: Vec<AgentMessage>,
    added: Vec<AgentMessage>,
}

impl Transcript {
    pub(super) fn new(context: Vec<AgentMessage>) -> Self {
        Self {
            context,
            added: Vec::new(),
        }
    }

    pub(super) fn context(&self) -> &[AgentMessage] {
        &self.context
    }

    /// Emit start/end for `message`, then append it.
    pub(super) fn append(&mut self, agent_emitter: &AgentEventEmitter, message: AgentMessage) {
        emit_message_lifecycle(agent_emitter, &message);
        self.record(message);
    }

    /// Append a message whose lifecycle events were already emitted.
    pub(super) fn record(&mut self, message: AgentMessage) {
        self.context.push(message.clone());
        self.added.push(message);
    }

    pub(super) fn into_added(self) -> Vec<AgentMessage> {
        self.added
    }
}
