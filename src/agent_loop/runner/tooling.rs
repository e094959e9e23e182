use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::HelmError;
use crate::tools::validation::check_arguments;
use crate::tools::{
    AgentToolResult, ToolArguments, ToolExecutionContext, ToolRegistry, ToolUpdateCallback,
};
use crate::types::{ToolCall, ToolResultMessage};

use super::control::AgentEventEmitter;
use super::message_events::Transcript;
use super::AgentEvent;

pub(super) const SKIPPED_TOOL_MESSAGE: &str = "Skipped due to queued user message.";
pub(super) const ABORTED_TOOL_MESSAGE: &str = "Tool execution was aborted";

#[derive(Debug, Clone)]
pub(super) struct ToolExecutionOutcome {
    pub(super) result: AgentToolResult,
    pub(super) is_error: bool,
}

impl ToolExecutionOutcome {
    fn ok(result: AgentToolResult) -> Self {
        Self {
            result,
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            result: AgentToolResult::text(text),
            is_error: true,
        }
    }
}

pub(super) fn emit_tool_execution_start(agent_emitter: &AgentEventEmitter, call: &ToolCall) {
    agent_emitter.emit(AgentEvent::ToolExecutionStart {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        args: call.arguments.clone(),
    });
}

pub(super) fn emit_tool_execution_end(
    agent_emitter: &AgentEventEmitter,
    call: &ToolCall,
    outcome: &ToolExecutionOutcome,
) {
    agent_emitter.emit(AgentEvent::ToolExecutionEnd {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        result: outcome.result.clone(),
        is_error: outcome.is_error,
    });
}

fn tool_error_text(error: &HelmError) -> String {
    match error {
        HelmError::ToolExecution { message, .. } => message.clone(),
        HelmError::InvalidArgument(message) => message.clone(),
        HelmError::ToolNotFound(name) => format!("Tool {name} not found"),
        other => other.to_string(),
    }
}

fn panic_text(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "unknown panic".to_string()
}

/// Run one call. Never fails: every problem becomes an error outcome.
pub(super) async fn execute_tool_call(
    tools: &ToolRegistry,
    call: &ToolCall,
    agent_emitter: &AgentEventEmitter,
    cancel: CancellationToken,
) -> ToolExecutionOutcome {
    if let Some(parse_error) = call.parse_error.as_ref() {
        return ToolExecutionOutcome::error(parse_error.clone());
    }
    let Some(tool) = tools.get(&call.name) else {
        return ToolExecutionOutcome::error(tool_error_text(&HelmError::ToolNotFound(
            call.name.clone(),
        )));
    };
    if let Err(err) = check_arguments(&call.arguments, tool.parameters()) {
        return ToolExecutionOutcome::error(tool_error_text(&err));
    }

    // Updates after the end event are dropped.
    let open = Arc::new(AtomicBool::new(true));
    let update_open = Arc::clone(&open);
    let update_emitter = agent_emitter.clone();
    let call_id = call.id.clone();
    let call_name = call.name.clone();
    let call_args = call.arguments.clone();
    let on_update: ToolUpdateCallback = Arc::new(move |partial_result: AgentToolResult| {
        if !update_open.load(Ordering::SeqCst) {
            return;
        }
        update_emitter.emit(AgentEvent::ToolExecutionUpdate {
            tool_call_id: call_id.clone(),
            tool_name: call_name.clone(),
            args: call_args.clone(),
            partial_result,
        });
    });

    let args = ToolArguments::new(call.arguments.clone());
    let ctx = ToolExecutionContext::new(call.id.clone(), cancel).with_update_callback(on_update);
    let execution = AssertUnwindSafe(tool.execute(&args, &ctx)).catch_unwind().await;
    open.store(false, Ordering::SeqCst);

    match execution {
        Ok(Ok(result)) => ToolExecutionOutcome::ok(result),
        Ok(Err(err)) => {
            tracing::warn!(
                tool_call_id = %call.id,
                tool_name = %call.name,
                error = %err,
                "tool execution failed"
            );
            ToolExecutionOutcome::error(tool_error_text(&err))
        }
        Err(payload) => {
            let text = panic_text(payload);
            tracing::warn!(
                tool_call_id = %call.id,
                tool_name = %call.name,
                panic = %text,
                "tool panicked"
            );
            ToolExecutionOutcome::error(format!("Tool {} panicked: {text}", call.name))
        }
    }
}

/// Append the tool result message and emit its lifecycle.
pub(super) fn append_tool_result(
    transcript: &mut Transcript,
    agent_emitter: &AgentEventEmitter,
    call: &ToolCall,
    outcome: ToolExecutionOutcome,
) -> ToolResultMessage {
    let message = ToolResultMessage {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        content: outcome.result.content,
        details: outcome.result.details,
        is_error: outcome.is_error,
        timestamp: Utc::now(),
    };
    transcript.append(agent_emitter, message.clone().into());
    message
}

fn append_synthetic_result(
    transcript: &mut Transcript,
    agent_emitter: &AgentEventEmitter,
    call: &ToolCall,
    text: &str,
) -> ToolResultMessage {
    let outcome = ToolExecutionOutcome::error(text);
    emit_tool_execution_start(agent_emitter, call);
    emit_tool_execution_end(agent_emitter, call, &outcome);
    append_tool_result(transcript, agent_emitter, call, outcome)
}

pub(super) fn append_skipped_tool_call(
    transcript: &mut Transcript,
    agent_emitter: &AgentEventEmitter,
    call: &ToolCall,
) -> ToolResultMessage {
    append_synthetic_result(transcript, agent_emitter, call, SKIPPED_TOOL_MESSAGE)
}

pub(super) fn append_aborted_tool_call(
    transcript: &mut Transcript,
    agent_emitter: &AgentEventEmitter,
    call: &ToolCall,
) -> ToolResultMessage {
    append_synthetic_result(transcript, agent_emitter, call, ABORTED_TOOL_MESSAGE)
}
