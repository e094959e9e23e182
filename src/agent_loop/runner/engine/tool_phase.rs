use tokio_util::sync::CancellationToken;

use super::super::control::{poll_messages, AgentEventEmitter};
use super::super::message_events::Transcript;
use super::super::tooling::{
    append_aborted_tool_call, append_skipped_tool_call, append_tool_result,
    emit_tool_execution_end, emit_tool_execution_start, execute_tool_call,
};
use super::super::RunRequest;
use crate::agent::message::AgentMessage;
use crate::types::{AssistantMessage, ToolCall, ToolResultMessage};

pub(super) struct ToolPhaseOutcome {
    pub(super) tool_results: Vec<ToolResultMessage>,
    /// Steering that interrupted the batch, if any.
    pub(super) steering: Option<Vec<AgentMessage>>,
}

pub(super) struct ToolPhaseArgs<'a> {
    pub(super) request: &'a RunRequest,
    pub(super) assistant: &'a AssistantMessage,
    pub(super) transcript: &'a mut Transcript,
    pub(super) agent_emitter: &'a AgentEventEmitter,
    pub(super) cancel: &'a CancellationToken,
}

/// Execute the assistant's tool calls one at a time, in order.
///
/// Every call ends with exactly one tool result message, including calls
/// skipped by steering or cancellation.
pub(super) async fn run_tool_phase(args: ToolPhaseArgs<'_>) -> ToolPhaseOutcome {
    let ToolPhaseArgs {
        request,
        assistant,
        transcript,
        agent_emitter,
        cancel,
    } = args;

    let calls: Vec<ToolCall> = assistant.tool_calls().into_iter().cloned().collect();
    let mut tool_results = Vec::with_capacity(calls.len());

    for (call_idx, call) in calls.iter().enumerate() {
        if cancel.is_cancelled() {
            for remaining in &calls[call_idx..] {
                tool_results.push(append_aborted_tool_call(transcript, agent_emitter, remaining));
            }
            break;
        }

        emit_tool_execution_start(agent_emitter, call);
        let outcome =
            execute_tool_call(&request.tools, call, agent_emitter, cancel.child_token()).await;
        emit_tool_execution_end(agent_emitter, call, &outcome);
        tool_results.push(append_tool_result(transcript, agent_emitter, call, outcome));

        let steering = poll_messages(request.get_steering_messages.as_ref()).await;
        if !steering.is_empty() {
            for remaining in &calls[call_idx + 1..] {
                tool_results.push(append_skipped_tool_call(transcript, agent_emitter, remaining));
            }
            return ToolPhaseOutcome {
                tool_results,
                steering: Some(steering),
            };
        }
    }

    ToolPhaseOutcome {
        tool_results,
        steering: None,
    }
}
