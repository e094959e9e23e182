//! Streaming surfaces: the assistant-message adapter and the agent loop stream.

mod common;

use std::sync::Arc;

use futures::StreamExt;
use helm::agent::AgentMessage;
use helm::agent_loop::{agent_loop, AgentEvent, RunRequest, RunStatus};
use helm::provider::{FinishReason, GenerationRequest, ProviderChunk, ScriptedClient, ScriptedTurn};
use helm::stream::{stream_assistant_response, AssistantMessageEvent};
use helm::types::StopReason;
use pretty_assertions::assert_eq;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use common::{assert_well_ordered, echo_tool, registry, TEST_MODEL};

fn event_name(event: &AssistantMessageEvent) -> &'static str {
    match event {
        AssistantMessageEvent::Start { .. } => "start",
        AssistantMessageEvent::TextStart { .. } => "text_start",
        AssistantMessageEvent::TextDelta { .. } => "text_delta",
        AssistantMessageEvent::TextEnd { .. } => "text_end",
        AssistantMessageEvent::ThinkingStart { .. } => "thinking_start",
        AssistantMessageEvent::ThinkingDelta { .. } => "thinking_delta",
        AssistantMessageEvent::ThinkingEnd { .. } => "thinking_end",
        AssistantMessageEvent::ToolCallStart { .. } => "tool_call_start",
        AssistantMessageEvent::ToolCallDelta { .. } => "tool_call_delta",
        AssistantMessageEvent::ToolCallEnd { .. } => "tool_call_end",
        AssistantMessageEvent::Done { .. } => "done",
        AssistantMessageEvent::Error { .. } => "error",
    }
}

#[tokio::test]
async fn adapter_closes_each_block_before_the_next_opens() {
    let client = Arc::new(ScriptedClient::new([ScriptedTurn::Chunks(vec![
        ProviderChunk::thinking("hmm"),
        ProviderChunk::text("Hel"),
        ProviderChunk::text("lo"),
        ProviderChunk::tool_call("call_1", "echo", r#"{"text":"#),
        ProviderChunk::tool_args(r#""hi"}"#),
        ProviderChunk::finish(FinishReason::ToolCalls),
    ])]));
    let request = GenerationRequest {
        model: TEST_MODEL.to_string(),
        ..Default::default()
    };

    let mut stream = stream_assistant_response(client, request, CancellationToken::new());
    let mut names = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("event timeout")
    {
        names.push(event_name(&event));
    }
    let message = stream.result().await.expect("final message");

    assert_eq!(
        names,
        vec![
            "start",
            "thinking_start",
            "thinking_delta",
            "thinking_end",
            "text_start",
            "text_delta",
            "text_delta",
            "text_end",
            "tool_call_start",
            "tool_call_delta",
            "tool_call_delta",
            "tool_call_end",
            "done",
        ]
    );
    assert_eq!(message.stop_reason, StopReason::ToolUse);
    assert_eq!(message.text(), "Hello");
    let calls = message.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].arguments, serde_json::json!({ "text": "hi" }));
}

#[tokio::test]
async fn adapter_reports_aborted_when_cancelled_before_call() {
    let client = Arc::new(ScriptedClient::new([ScriptedTurn::text("never")]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stream = stream_assistant_response(client.clone(), GenerationRequest::default(), cancel);
    let message = stream.result().await.expect("final message");

    assert_eq!(message.stop_reason, StopReason::Aborted);
    assert_eq!(message.error_message.as_deref(), Some("Request was aborted"));
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn agent_loop_stream_yields_ordered_events_and_result() {
    let client = Arc::new(ScriptedClient::new([
        ScriptedTurn::tool_calls([("call_1", "echo", serde_json::json!({ "text": "x" }))]),
        ScriptedTurn::text("done"),
    ]));
    let request =
        RunRequest::new(TEST_MODEL, Vec::new()).with_tools(registry(vec![echo_tool()]));

    let mut stream = agent_loop(
        client,
        vec![AgentMessage::user("hello")],
        request,
        CancellationToken::new(),
    );
    let mut events = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("event timeout")
    {
        events.push(event);
    }
    let result = stream.result().await.expect("run result");

    assert_well_ordered(&events);
    assert_eq!(result.status, RunStatus::Completed);
    let Some(AgentEvent::AgentEnd { messages, .. }) = events.last() else {
        panic!("expected agent_end last");
    };
    assert_eq!(messages, &result.messages);
    let tool_end = events.iter().find_map(|event| match event {
        AgentEvent::ToolExecutionEnd { result, is_error, .. } => {
            Some((result.text_content(), *is_error))
        }
        _ => None,
    });
    assert_eq!(tool_end, Some(("echo: x".to_string(), false)));
}

#[test]
fn agent_events_serialize_with_snake_case_tags() {
    let event = AgentEvent::ToolExecutionStart {
        tool_call_id: "call_1".to_string(),
        tool_name: "echo".to_string(),
        args: serde_json::json!({ "text": "x" }),
    };
    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["type"], "tool_execution_start");
    assert_eq!(value["tool_call_id"], "call_1");

    let back: AgentEvent = serde_json::from_value(value).expect("deserialize");
    assert_eq!(back, event);
}
