use super::*;

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use tokio::time::{timeout, Duration};

use crate::agent_loop::RunStatus;
use crate::types::StopReason;

mod support;

mod stream_lifecycle;

use support::{
    assert_event_invariants, assert_tool_results_paired, capture_agent_events, echo_tool,
    event_kinds, lifecycle_kinds, message_kinds, registry, test_runner, ProviderScenario,
    TEST_MODEL,
};

fn prompt(text: &str) -> Vec<AgentMessage> {
    vec![AgentMessage::user(text)]
}

#[tokio::test]
async fn tool_use_then_stop_builds_expected_log() {
    let (runner, client) = test_runner(ProviderScenario::ToolThenText);
    let calls = Arc::new(AtomicUsize::new(0));
    let (sink, events) = capture_agent_events();
    let request = RunRequest::new(TEST_MODEL, Vec::new())
        .with_tools(registry(vec![echo_tool(calls.clone())]))
        .with_agent_event_sink(sink);

    let result = timeout(
        Duration::from_secs(2),
        runner.run(prompt("hello"), request, CancellationToken::new()),
    )
    .await
    .expect("run timeout");

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(
        message_kinds(&result.messages),
        vec!["user", "assistant", "tool_result", "assistant"]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first = result.messages[1].as_assistant().expect("assistant");
    assert_eq!(first.stop_reason, StopReason::ToolUse);
    let tool_result = result.messages[2].as_tool_result().expect("tool result");
    assert_eq!(tool_result.tool_call_id, "call_1");
    assert!(!tool_result.is_error);
    let last = result.messages[3].as_assistant().expect("assistant");
    assert_eq!(last.text(), "done");
    assert_eq!(last.stop_reason, StopReason::Stop);
    assert_tool_results_paired(&result.messages);

    let events = events.lock().expect("agent event lock");
    assert_event_invariants(&events);
    let turn_indices: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            AgentEvent::TurnStart { turn_index, .. } => Some(*turn_index),
            _ => None,
        })
        .collect();
    assert_eq!(turn_indices, vec![1, 2]);

    // second request carries the tool result back to the model
    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "echo");
}

#[tokio::test]
async fn agent_end_carries_all_new_messages() {
    let (runner, _client) = test_runner(ProviderScenario::TextOnly);
    let (sink, events) = capture_agent_events();
    let request = RunRequest::new(TEST_MODEL, vec![AgentMessage::user("earlier")])
        .with_agent_event_sink(sink);

    let result = runner
        .run(prompt("hello"), request, CancellationToken::new())
        .await;

    let events = events.lock().expect("agent event lock");
    let Some(AgentEvent::AgentEnd { run_id, messages }) = events.last() else {
        panic!("expected agent_end last");
    };
    assert_eq!(*run_id, result.run_id);
    assert_eq!(messages, &result.messages);
    assert_eq!(message_kinds(messages), vec!["user", "assistant"]);
}

#[tokio::test]
async fn start_streams_events_and_resolves_result() {
    let (runner, _client) = test_runner(ProviderScenario::TextOnly);
    let mut stream = runner.start(
        prompt("hello"),
        RunRequest::new(TEST_MODEL, Vec::new()),
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

    assert_event_invariants(&events);
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(
        lifecycle_kinds(&events),
        vec![
            "agent_start",
            "turn_start",
            "message_start",
            "message_end",
            "message_start",
            "message_end",
            "turn_end",
            "agent_end",
        ]
    );
    assert!(event_kinds(&events).contains(&"message_update"));
}

#[tokio::test]
async fn start_still_forwards_to_request_sink() {
    let (runner, _client) = test_runner(ProviderScenario::TextOnly);
    let (sink, captured) = capture_agent_events();
    let stream = runner.start(
        prompt("hello"),
        RunRequest::new(TEST_MODEL, Vec::new()).with_agent_event_sink(sink),
        CancellationToken::new(),
    );
    let result = timeout(Duration::from_secs(2), stream.result())
        .await
        .expect("result timeout")
        .expect("run result");
    assert!(result.is_completed());
    assert_event_invariants(&captured.lock().expect("agent event lock"));
}
