//! Turns a raw provider chunk stream into canonical assistant events.

use std::sync::Arc;

use futures::StreamExt;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;

use super::event_stream::{EventSink, EventStream};
use super::events::{AssistantMessageEvent, AssistantMessageEventStream};
use crate::error::HelmError;
use crate::provider::{ChunkStream, FinishReason, GenerationRequest, ModelClient, ProviderChunk};
use crate::types::{
    AssistantContent, AssistantMessage, StopReason, TextContent, ThinkingContent, ToolCall,
};

/// Message text recorded on a cancelled assistant message.
pub const ABORTED_MESSAGE: &str = "Request was aborted";

/// Start one generation call and return its event stream immediately.
///
/// The stream always begins with `start` and ends with exactly one `done` or
/// `error` event; its result resolves to the final assistant message.
pub fn stream_assistant_response(
    client: Arc<dyn ModelClient>,
    request: GenerationRequest,
    cancel: CancellationToken,
) -> AssistantMessageEventStream {
    let (sink, stream) = EventStream::channel();
    tokio::spawn(async move {
        drive(client.as_ref(), &request, &cancel, &sink).await;
    });
    stream
}

async fn drive(
    client: &dyn ModelClient,
    request: &GenerationRequest,
    cancel: &CancellationToken,
    sink: &EventSink<AssistantMessageEvent>,
) {
    let mut builder = MessageBuilder::new(client.provider_name(), &request.model);
    sink.push(AssistantMessageEvent::Start {
        partial: builder.snapshot(),
    });

    let mut chunks = match open_stream(client, request, cancel).await {
        Ok(chunks) => chunks,
        Err(HelmError::Aborted) => {
            builder.fail(sink, StopReason::Aborted, ABORTED_MESSAGE);
            return;
        }
        Err(err) => {
            builder.fail(sink, StopReason::Error, err.to_string());
            return;
        }
    };

    let mut finish: Option<FinishReason> = None;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                builder.fail(sink, StopReason::Aborted, ABORTED_MESSAGE);
                return;
            }
            _ = sink.abandoned() => {
                tracing::debug!("assistant event stream dropped; stopping generation");
                return;
            }
            next = chunks.next() => next,
        };
        let Some(next) = next else {
            break;
        };
        match next {
            Ok(ProviderChunk::TextDelta { text }) => builder.push_text(sink, &text),
            Ok(ProviderChunk::ThinkingDelta { text, signature }) => {
                builder.push_thinking(sink, &text, signature.as_deref())
            }
            Ok(ProviderChunk::ToolCallDelta {
                id,
                name,
                arguments,
            }) => builder.push_tool_call(sink, id, name, &arguments),
            Ok(ProviderChunk::Usage { usage }) => builder.message.usage = usage,
            // Usage may trail the finish marker; drain until the stream ends.
            Ok(ProviderChunk::Finish { reason }) => finish = Some(reason),
            Ok(ProviderChunk::Error { message }) => {
                builder.fail(sink, StopReason::Error, message);
                return;
            }
            Err(err) => {
                builder.fail(sink, StopReason::Error, err.to_string());
                return;
            }
        }
    }

    builder.close_open_block(sink);
    let reason = resolve_stop_reason(finish, builder.message.has_tool_calls());
    builder.message.stop_reason = reason;
    sink.push(AssistantMessageEvent::Done {
        reason,
        message: builder.message,
    });
}

/// Call the client, retrying server-requested rate-limit delays.
async fn open_stream(
    client: &dyn ModelClient,
    request: &GenerationRequest,
    cancel: &CancellationToken,
) -> Result<ChunkStream, HelmError> {
    loop {
        if cancel.is_cancelled() {
            return Err(HelmError::Aborted);
        }
        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HelmError::Aborted),
            attempt = client.stream(request, cancel.child_token()) => attempt,
        };
        match attempt {
            Ok(chunks) => return Ok(chunks),
            Err(HelmError::RateLimited { retry_after_ms }) => {
                let retry_after_ms = retry_after_ms.unwrap_or(0);
                if retry_after_ms == 0 {
                    return Err(HelmError::Stream(
                        "rate limited without retry_after hint".to_string(),
                    ));
                }
                let max_retry_delay_ms = request.options.max_retry_delay_ms;
                if max_retry_delay_ms > 0 && retry_after_ms > max_retry_delay_ms {
                    return Err(HelmError::Stream(format!(
                        "rate limit retry delay {retry_after_ms}ms exceeds max_retry_delay_ms={max_retry_delay_ms}"
                    )));
                }
                tracing::warn!(retry_after_ms, "rate limited; retrying generation");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(HelmError::Aborted),
                    _ = time::sleep(Duration::from_millis(retry_after_ms)) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn resolve_stop_reason(finish: Option<FinishReason>, has_tool_calls: bool) -> StopReason {
    match finish {
        Some(FinishReason::Length) => StopReason::Length,
        Some(FinishReason::ContentFilter) => StopReason::Sensitive,
        Some(FinishReason::ToolCalls) => StopReason::ToolUse,
        Some(FinishReason::Stop) | None if has_tool_calls => StopReason::ToolUse,
        Some(FinishReason::Stop) | None => StopReason::Stop,
    }
}

enum OpenBlock {
    Text,
    Thinking,
    ToolCall { id: String, buffer: String },
}

struct MessageBuilder {
    message: AssistantMessage,
    open: Option<(usize, OpenBlock)>,
    next_call: usize,
}

impl MessageBuilder {
    fn new(provider: &str, model: &str) -> Self {
        Self {
            message: AssistantMessage::empty(provider, model),
            open: None,
            next_call: 0,
        }
    }

    fn snapshot(&self) -> AssistantMessage {
        self.message.clone()
    }

    fn open_block(&mut self, block: AssistantContent, kind: OpenBlock) -> usize {
        let index = self.message.content.len();
        self.message.content.push(block);
        self.open = Some((index, kind));
        index
    }

    fn push_text(&mut self, sink: &EventSink<AssistantMessageEvent>, delta: &str) {
        let index = match self.open {
            Some((index, OpenBlock::Text)) => index,
            _ => {
                self.close_open_block(sink);
                let index =
                    self.open_block(AssistantContent::Text(TextContent::default()), OpenBlock::Text);
                sink.push(AssistantMessageEvent::TextStart {
                    content_index: index,
                    partial: self.snapshot(),
                });
                index
            }
        };
        if let Some(AssistantContent::Text(block)) = self.message.content.get_mut(index) {
            block.text.push_str(delta);
        }
        sink.push(AssistantMessageEvent::TextDelta {
            content_index: index,
            delta: delta.to_string(),
            partial: self.snapshot(),
        });
    }

    fn push_thinking(
        &mut self,
        sink: &EventSink<AssistantMessageEvent>,
        delta: &str,
        signature: Option<&str>,
    ) {
        let index = match self.open {
            Some((index, OpenBlock::Thinking)) => index,
            _ => {
                self.close_open_block(sink);
                let index = self.open_block(
                    AssistantContent::Thinking(ThinkingContent::default()),
                    OpenBlock::Thinking,
                );
                sink.push(AssistantMessageEvent::ThinkingStart {
                    content_index: index,
                    partial: self.snapshot(),
                });
                index
            }
        };
        if let Some(AssistantContent::Thinking(block)) = self.message.content.get_mut(index) {
            block.thinking.push_str(delta);
            if let Some(signature) = signature {
                block
                    .thinking_signature
                    .get_or_insert_with(String::new)
                    .push_str(signature);
            }
        }
        sink.push(AssistantMessageEvent::ThinkingDelta {
            content_index: index,
            delta: delta.to_string(),
            partial: self.snapshot(),
        });
    }

    fn push_tool_call(
        &mut self,
        sink: &EventSink<AssistantMessageEvent>,
        id: Option<String>,
        name: Option<String>,
        arguments: &str,
    ) {
        let continues_open = match (&self.open, &id) {
            (Some((_, OpenBlock::ToolCall { .. })), None) => true,
            (Some((_, OpenBlock::ToolCall { id: open_id, .. })), Some(id)) => open_id == id,
            _ => false,
        };
        if !continues_open {
            self.close_open_block(sink);
            let id = id.unwrap_or_else(|| format!("call_{}", self.next_call));
            self.next_call += 1;
            let call = ToolCall::new(
                id.clone(),
                name.clone().unwrap_or_default(),
                serde_json::json!({}),
            );
            let index = self.open_block(
                AssistantContent::ToolCall(call),
                OpenBlock::ToolCall {
                    id,
                    buffer: String::new(),
                },
            );
            sink.push(AssistantMessageEvent::ToolCallStart {
                content_index: index,
                partial: self.snapshot(),
            });
        }

        let Some((index, OpenBlock::ToolCall { buffer, .. })) = self.open.as_mut() else {
            return;
        };
        let index = *index;
        buffer.push_str(arguments);
        let partial_args = serde_json::from_str::<serde_json::Value>(buffer.as_str())
            .ok()
            .filter(serde_json::Value::is_object);
        if let Some(AssistantContent::ToolCall(call)) = self.message.content.get_mut(index) {
            if call.name.is_empty() {
                if let Some(name) = name {
                    call.name = name;
                }
            }
            if let Some(args) = partial_args {
                call.arguments = args;
            }
        }
        sink.push(AssistantMessageEvent::ToolCallDelta {
            content_index: index,
            delta: arguments.to_string(),
            partial: self.snapshot(),
        });
    }

    fn close_open_block(&mut self, sink: &EventSink<AssistantMessageEvent>) {
        let Some((index, kind)) = self.open.take() else {
            return;
        };
        let event = match kind {
            OpenBlock::Text => {
                let Some(AssistantContent::Text(block)) = self.message.content.get(index) else {
                    return;
                };
                AssistantMessageEvent::TextEnd {
                    content_index: index,
                    content: block.text.clone(),
                    partial: self.snapshot(),
                }
            }
            OpenBlock::Thinking => {
                let Some(AssistantContent::Thinking(block)) = self.message.content.get(index)
                else {
                    return;
                };
                AssistantMessageEvent::ThinkingEnd {
                    content_index: index,
                    content: block.thinking.clone(),
                    partial: self.snapshot(),
                }
            }
            OpenBlock::ToolCall { buffer, .. } => {
                let Some(AssistantContent::ToolCall(call)) = self.message.content.get_mut(index)
                else {
                    return;
                };
                match parse_tool_arguments(&buffer) {
                    Ok(args) => call.arguments = args,
                    Err(parse_error) => {
                        call.arguments = serde_json::json!({});
                        call.parse_error = Some(parse_error);
                    }
                }
                let tool_call = call.clone();
                AssistantMessageEvent::ToolCallEnd {
                    content_index: index,
                    tool_call,
                    partial: self.snapshot(),
                }
            }
        };
        sink.push(event);
    }

    /// Record a terminal failure. Open blocks stay open.
    fn fail(
        mut self,
        sink: &EventSink<AssistantMessageEvent>,
        reason: StopReason,
        error: impl Into<String>,
    ) {
        let error = error.into();
        tracing::warn!(stop_reason = %reason, error = %error, "generation ended early");
        self.message.stop_reason = reason;
        self.message.error_message = Some(error);
        sink.push(AssistantMessageEvent::Error {
            reason,
            error: self.message,
        });
    }
}

/// Parse buffered tool-call arguments. Empty input is `{}`.
pub(crate) fn parse_tool_arguments(raw: &str) -> Result<serde_json::Value, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(serde_json::json!({}));
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!(
            "tool arguments must be a JSON object, got: {other}"
        )),
        Err(err) => Err(format!("invalid tool arguments JSON: {err}")),
    }
}
