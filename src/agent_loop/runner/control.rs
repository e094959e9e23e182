use crate::agent::message::AgentMessage;

use super::super::events::AgentEvent;
use super::super::types::{RunId, RunResult, RunStatus};
use super::{AgentEventSink, MessageBatchFn};

#[derive(Clone)]
pub(super) struct AgentEventEmitter {
    sink: Option<AgentEventSink>,
}

impl AgentEventEmitter {
    pub(super) fn new(sink: Option<AgentEventSink>) -> Self {
        Self { sink }
    }

    pub(super) fn emit(&self, event: AgentEvent) {
        if let Some(sink) = &self.sink {
            (sink)(event);
        }
    }
}

/// Empty when no source is configured.
pub(super) async fn poll_messages(source: Option<&MessageBatchFn>) -> Vec<AgentMessage> {
    match source {
        Some(poll) => poll().await,
        None => Vec::new(),
    }
}

/// Result derived from the last assistant message of the run.
pub(super) fn settle_result(run_id: RunId, new_messages: Vec<AgentMessage>) -> RunResult {
    let last_assistant = new_messages.iter().rev().find_map(AgentMessage::as_assistant);
    let Some(assistant) = last_assistant else {
        return RunResult::completed(run_id, new_messages);
    };
    match RunStatus::from_stop_reason(assistant.stop_reason) {
        RunStatus::Completed => RunResult::completed(run_id, new_messages),
        RunStatus::Aborted => RunResult::aborted(run_id, new_messages),
        RunStatus::Failed => {
            let error = assistant
                .error_message
                .clone()
                .unwrap_or_else(|| "generation failed".to_string());
            RunResult::failed(run_id, error, new_messages)
        }
    }
}

pub(super) fn debug_enabled() -> bool {
    matches!(std::env::var("HELM_DEBUG").as_deref(), Ok("1"))
}
