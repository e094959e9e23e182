//! Run state machine.
//!
//! A run moves through [`LoopPhase`]s driven by named [`Transition`]s. The
//! table in [`LoopPhase::next`] is the only place phases change.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::message::AgentMessage;
use crate::error::HelmError;
use crate::provider::ModelClient;
use crate::types::{AssistantMessage, ToolResultMessage};

use super::control::{debug_enabled, poll_messages, settle_result, AgentEventEmitter};
use super::message_events::Transcript;
use super::{AgentEvent, RunRequest, RunResult};

mod llm_phase;
mod tool_phase;

use llm_phase::{run_llm_phase, LlmPhaseArgs};
use tool_phase::{run_tool_phase, ToolPhaseArgs, ToolPhaseOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum LoopPhase {
    Start,
    Streaming,
    ExecutingTools,
    AwaitingFollowUp,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Transition {
    PromptsAccepted,
    /// Stop reason was `error` or `aborted`.
    GenerationFailed,
    ToolCallsRequested,
    /// No tool calls, steering queued.
    SteeringQueued,
    /// No tool calls, no steering.
    TurnSettled,
    ToolsFinished,
    FollowUpQueued,
    Idle,
}

impl LoopPhase {
    pub(crate) fn next(self, transition: Transition) -> Result<LoopPhase, HelmError> {
        use LoopPhase::*;
        use Transition::*;
        match (self, transition) {
            (Start, PromptsAccepted) => Ok(Streaming),
            (Streaming, GenerationFailed) => Ok(Ended),
            (Streaming, ToolCallsRequested) => Ok(ExecutingTools),
            (Streaming, SteeringQueued) => Ok(Streaming),
            (Streaming, TurnSettled) => Ok(AwaitingFollowUp),
            (ExecutingTools, ToolsFinished) => Ok(Streaming),
            (AwaitingFollowUp, FollowUpQueued) => Ok(Streaming),
            (AwaitingFollowUp, Idle) => Ok(Ended),
            (from, transition) => Err(HelmError::InvalidState(format!(
                "invalid loop transition {transition} from {from}"
            ))),
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        self == LoopPhase::Ended
    }
}

struct RunState {
    transcript: Transcript,
    /// Input for the next generation call.
    pending: Vec<AgentMessage>,
    turn_index: usize,
    turn_open: bool,
    /// Assistant message whose tool calls are about to run.
    current: Option<AssistantMessage>,
}

impl RunState {
    fn open_turn(&mut self, request: &RunRequest, agent_emitter: &AgentEventEmitter) {
        if self.turn_open {
            return;
        }
        self.turn_index += 1;
        self.turn_open = true;
        agent_emitter.emit(AgentEvent::TurnStart {
            run_id: request.run_id,
            turn_index: self.turn_index,
        });
    }

    fn close_turn(
        &mut self,
        request: &RunRequest,
        agent_emitter: &AgentEventEmitter,
        message: AssistantMessage,
        tool_results: Vec<ToolResultMessage>,
    ) {
        self.turn_open = false;
        agent_emitter.emit(AgentEvent::TurnEnd {
            run_id: request.run_id,
            turn_index: self.turn_index,
            message: message.into(),
            tool_results,
        });
    }
}

pub(super) async fn drive_run(
    client: Arc<dyn ModelClient>,
    prompts: Vec<AgentMessage>,
    request: RunRequest,
    cancel: CancellationToken,
) -> RunResult {
    let agent_emitter = AgentEventEmitter::new(request.agent_event_sink.clone());
    let mut state = RunState {
        transcript: Transcript::new(request.messages.clone()),
        pending: Vec::new(),
        turn_index: 0,
        turn_open: false,
        current: None,
    };
    let mut phase = LoopPhase::Start;

    while !phase.is_terminal() {
        let transition = match phase {
            LoopPhase::Start => {
                agent_emitter.emit(AgentEvent::AgentStart {
                    run_id: request.run_id,
                });
                state.open_turn(&request, &agent_emitter);
                for prompt in prompts.iter().cloned() {
                    state.transcript.append(&agent_emitter, prompt);
                }
                state.pending = poll_messages(request.get_steering_messages.as_ref()).await;
                Transition::PromptsAccepted
            }
            LoopPhase::Streaming => {
                state.open_turn(&request, &agent_emitter);
                for message in std::mem::take(&mut state.pending) {
                    state.transcript.append(&agent_emitter, message);
                }
                let assistant = run_llm_phase(LlmPhaseArgs {
                    request: &request,
                    client: &client,
                    context: state.transcript.context(),
                    agent_emitter: &agent_emitter,
                    cancel: &cancel,
                    turn_index: state.turn_index,
                })
                .await;
                state.transcript.record(assistant.clone().into());

                if assistant.is_terminal_failure() {
                    state.close_turn(&request, &agent_emitter, assistant, Vec::new());
                    Transition::GenerationFailed
                } else if assistant.has_tool_calls() {
                    state.current = Some(assistant);
                    Transition::ToolCallsRequested
                } else {
                    state.close_turn(&request, &agent_emitter, assistant, Vec::new());
                    state.pending = poll_messages(request.get_steering_messages.as_ref()).await;
                    if state.pending.is_empty() {
                        Transition::TurnSettled
                    } else {
                        Transition::SteeringQueued
                    }
                }
            }
            LoopPhase::ExecutingTools => {
                let Some(assistant) = state.current.take() else {
                    return fail_run(
                        &request,
                        &agent_emitter,
                        state.transcript,
                        "tool phase entered without an assistant message",
                    );
                };
                let ToolPhaseOutcome {
                    tool_results,
                    steering,
                } = run_tool_phase(ToolPhaseArgs {
                    request: &request,
                    assistant: &assistant,
                    transcript: &mut state.transcript,
                    agent_emitter: &agent_emitter,
                    cancel: &cancel,
                })
                .await;
                state.close_turn(&request, &agent_emitter, assistant, tool_results);
                state.pending = match steering {
                    Some(steering) => steering,
                    None => poll_messages(request.get_steering_messages.as_ref()).await,
                };
                Transition::ToolsFinished
            }
            LoopPhase::AwaitingFollowUp => {
                let follow_ups = poll_messages(request.get_follow_up_messages.as_ref()).await;
                if follow_ups.is_empty() {
                    Transition::Idle
                } else {
                    state.pending = follow_ups;
                    Transition::FollowUpQueued
                }
            }
            LoopPhase::Ended => break,
        };

        if debug_enabled() {
            tracing::debug!(
                run_id = %request.run_id,
                turn_index = state.turn_index,
                from = %phase,
                transition = %transition,
                "helm loop transition"
            );
        }
        phase = match phase.next(transition) {
            Ok(next) => next,
            Err(err) => {
                return fail_run(&request, &agent_emitter, state.transcript, err.to_string());
            }
        };
    }

    let new_messages = state.transcript.into_added();
    agent_emitter.emit(AgentEvent::AgentEnd {
        run_id: request.run_id,
        messages: new_messages.clone(),
    });
    let result = settle_result(request.run_id, new_messages);
    if debug_enabled() {
        tracing::debug!(
            run_id = %request.run_id,
            status = ?result.status,
            turns = state.turn_index,
            "helm run finished"
        );
    }
    result
}

fn fail_run(
    request: &RunRequest,
    agent_emitter: &AgentEventEmitter,
    transcript: Transcript,
    reason: impl Into<String>,
) -> RunResult {
    let reason = reason.into();
    tracing::warn!(run_id = %request.run_id, error = %reason, "helm run failed");
    let new_messages = transcript.into_added();
    agent_emitter.emit(AgentEvent::AgentEnd {
        run_id: request.run_id,
        messages: new_messages.clone(),
    });
    RunResult::failed(request.run_id, reason, new_messages)
}
