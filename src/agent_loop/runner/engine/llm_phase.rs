use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::super::control::{debug_enabled, AgentEventEmitter};
use super::super::{AgentEvent, RunRequest};
use crate::agent::message::{convert_to_llm, AgentMessage};
use crate::provider::{GenerationRequest, ModelClient};
use crate::stream::{stream_assistant_response, AssistantMessageEvent};
use crate::types::{AssistantMessage, StopReason};

pub(super) struct LlmPhaseArgs<'a> {
    pub(super) request: &'a RunRequest,
    pub(super) client: &'a Arc<dyn ModelClient>,
    pub(super) context: &'a [AgentMessage],
    pub(super) agent_emitter: &'a AgentEventEmitter,
    pub(super) cancel: &'a CancellationToken,
    pub(super) turn_index: usize,
}

/// One generation call. Always yields a final assistant message; failures
/// are recorded in its stop reason.
pub(super) async fn run_llm_phase(args: LlmPhaseArgs<'_>) -> AssistantMessage {
    let LlmPhaseArgs {
        request,
        client,
        context,
        agent_emitter,
        cancel,
        turn_index,
    } = args;

    let llm_context = if let Some(ref convert) = request.convert_to_llm {
        convert(context.to_vec()).await
    } else {
        convert_to_llm(context)
    };
    let messages = if let Some(ref transform) = request.transform_context {
        transform(llm_context).await
    } else {
        llm_context
    };
    let api_key = match request.get_api_key {
        Some(ref resolve) => resolve(client.provider_name().to_string()).await,
        None => None,
    };

    let generation = GenerationRequest {
        model: request.model.clone(),
        system_prompt: request.system_prompt.clone(),
        messages,
        tools: request.tools.definitions(),
        options: request.options.clone(),
        session_id: request.session_id.clone(),
        api_key,
    };

    let mut stream =
        stream_assistant_response(Arc::clone(client), generation, cancel.child_token());
    let mut message_open = false;
    let mut final_message: Option<AssistantMessage> = None;

    while let Some(event) = stream.next().await {
        match event {
            AssistantMessageEvent::Start { partial } => {
                agent_emitter.emit(AgentEvent::MessageStart {
                    message: partial.into(),
                });
                message_open = true;
            }
            AssistantMessageEvent::Done { message, .. } => {
                final_message = Some(message);
            }
            AssistantMessageEvent::Error { error, .. } => {
                final_message = Some(error);
            }
            update => {
                agent_emitter.emit(AgentEvent::MessageUpdate {
                    message: update.message().clone().into(),
                    assistant_event: update,
                });
            }
        }
    }

    let message = final_message.unwrap_or_else(|| {
        let mut message = AssistantMessage::empty(client.provider_name(), &request.model);
        message.stop_reason = StopReason::Error;
        message.error_message = Some("generation stream ended without a result".to_string());
        message
    });
    if !message_open {
        agent_emitter.emit(AgentEvent::MessageStart {
            message: message.clone().into(),
        });
    }
    agent_emitter.emit(AgentEvent::MessageEnd {
        message: message.clone().into(),
    });

    if message.is_terminal_failure() {
        tracing::warn!(
            run_id = %request.run_id,
            turn_index,
            stop_reason = %message.stop_reason,
            error = message.error_message.as_deref().unwrap_or_default(),
            "generation ended without success"
        );
    } else if debug_enabled() {
        let tool_names = message
            .tool_calls()
            .iter()
            .map(|call| call.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        tracing::debug!(
            run_id = %request.run_id,
            turn_index,
            stop_reason = %message.stop_reason,
            tool_calls = message.tool_calls().len(),
            tool_names = %tool_names,
            text_len = message.text().len(),
            "helm turn generated"
        );
    }

    message
}
