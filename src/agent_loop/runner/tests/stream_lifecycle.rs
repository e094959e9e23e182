use super::*;

use crate::provider::{ProviderChunk, ScriptedTurn};
use crate::stream::AssistantMessageEvent;
use crate::types::Message;

use super::support::scripted_runner;

#[tokio::test]
async fn assistant_updates_sit_between_start_and_end() {
    let (runner, _client) = test_runner(ProviderScenario::TextOnly);
    let (sink, events) = capture_agent_events();
    let request = RunRequest::new(TEST_MODEL, Vec::new()).with_agent_event_sink(sink);

    runner
        .run(prompt("hello"), request, CancellationToken::new())
        .await;

    let events = events.lock().expect("agent event lock");
    let start_idx = events
        .iter()
        .position(|event| {
            matches!(event, AgentEvent::MessageStart { message } if message.is_assistant())
        })
        .expect("expected assistant message_start");
    let update_idx = events
        .iter()
        .position(|event| {
            matches!(
                event,
                AgentEvent::MessageUpdate {
                    assistant_event: AssistantMessageEvent::TextDelta { delta, .. },
                    ..
                } if delta == "done"
            )
        })
        .expect("expected text delta update");
    let end_idx = events
        .iter()
        .position(|event| {
            matches!(event, AgentEvent::MessageEnd { message } if message.is_assistant())
        })
        .expect("expected assistant message_end");
    assert!(start_idx < update_idx);
    assert!(update_idx < end_idx);

    let AgentEvent::MessageEnd { message } = &events[end_idx] else {
        unreachable!();
    };
    assert_eq!(message.as_assistant().map(|m| m.text()), Some("done".to_string()));
}

#[tokio::test]
async fn stream_error_fails_run_and_keeps_partial_message() {
    let (runner, _client) = test_runner(ProviderScenario::TextThenStreamError);
    let (sink, events) = capture_agent_events();
    let request = RunRequest::new(TEST_MODEL, Vec::new()).with_agent_event_sink(sink);

    let result = timeout(
        Duration::from_secs(2),
        runner.run(prompt("hello"), request, CancellationToken::new()),
    )
    .await
    .expect("run timeout");

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result
        .error
        .as_deref()
        .is_some_and(|error| error.contains("connection reset")));
    let assistant = result
        .messages
        .last()
        .and_then(AgentMessage::as_assistant)
        .expect("assistant message");
    assert_eq!(assistant.stop_reason, StopReason::Error);
    assert_eq!(assistant.text(), "partial");

    let events = events.lock().expect("agent event lock");
    assert_event_invariants(&events);
    let kinds = lifecycle_kinds(&events);
    assert_eq!(
        kinds[kinds.len() - 3..].to_vec(),
        vec!["message_end", "turn_end", "agent_end"]
    );
}

#[tokio::test]
async fn provider_failure_at_call_start_still_closes_message() {
    let (runner, _client) = scripted_runner(vec![ScriptedTurn::Fail("unavailable".to_string())]);
    let (sink, events) = capture_agent_events();
    let request = RunRequest::new(TEST_MODEL, Vec::new()).with_agent_event_sink(sink);

    let result = runner
        .run(prompt("hello"), request, CancellationToken::new())
        .await;

    assert_eq!(result.status, RunStatus::Failed);
    let events = events.lock().expect("agent event lock");
    assert_event_invariants(&events);
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
}

#[tokio::test]
async fn cancellation_mid_stream_aborts_without_tool_execution() {
    let (runner, _client) = test_runner(ProviderScenario::StallAfterText);
    let (sink, events) = capture_agent_events();
    let request = RunRequest::new(TEST_MODEL, Vec::new()).with_agent_event_sink(sink);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = timeout(
        Duration::from_secs(2),
        runner.run(prompt("hello"), request, cancel),
    )
    .await
    .expect("run timeout");

    assert_eq!(result.status, RunStatus::Aborted);
    let assistant = result
        .messages
        .last()
        .and_then(AgentMessage::as_assistant)
        .expect("assistant message");
    assert_eq!(assistant.stop_reason, StopReason::Aborted);
    assert_eq!(assistant.error_message.as_deref(), Some("Request was aborted"));
    assert_eq!(assistant.text(), "partial");

    let events = events.lock().expect("agent event lock");
    assert_event_invariants(&events);
    assert!(!events
        .iter()
        .any(|event| matches!(event, AgentEvent::ToolExecutionStart { .. })));
}

#[tokio::test]
async fn cancelled_before_start_still_emits_agent_end() {
    let (runner, client) = test_runner(ProviderScenario::TextOnly);
    let (sink, events) = capture_agent_events();
    let request = RunRequest::new(TEST_MODEL, Vec::new()).with_agent_event_sink(sink);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = runner.run(prompt("hello"), request, cancel).await;

    assert_eq!(result.status, RunStatus::Aborted);
    assert!(client.requests().is_empty());
    assert_event_invariants(&events.lock().expect("agent event lock"));
}

#[tokio::test]
async fn continue_rejects_empty_or_assistant_tail() {
    let (runner, client) = test_runner(ProviderScenario::TextOnly);

    let err = runner
        .continue_run(RunRequest::new(TEST_MODEL, Vec::new()), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no messages in context"));

    let tail = AgentMessage::from(crate::types::AssistantMessage::empty("stub", TEST_MODEL));
    let err = runner
        .continue_run(
            RunRequest::new(TEST_MODEL, vec![AgentMessage::user("hi"), tail.clone()]),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HelmError::InvalidState(_)));

    let streamed = agent_loop_continue(
        client.clone(),
        RunRequest::new(TEST_MODEL, vec![tail]),
        CancellationToken::new(),
    );
    assert!(streamed.is_err());
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn continue_resumes_from_trailing_user_message() {
    let (runner, client) = test_runner(ProviderScenario::TextOnly);
    let (sink, events) = capture_agent_events();
    let request = RunRequest::new(TEST_MODEL, vec![AgentMessage::user("retry me")])
        .with_agent_event_sink(sink);

    let result = runner
        .continue_run(request, CancellationToken::new())
        .await
        .expect("continue");

    assert_eq!(message_kinds(&result.messages), vec!["assistant"]);
    assert_eq!(client.requests()[0].messages.len(), 1);
    let events = events.lock().expect("agent event lock");
    assert_event_invariants(&events);
    assert_eq!(
        lifecycle_kinds(&events),
        vec![
            "agent_start",
            "turn_start",
            "message_start",
            "message_end",
            "turn_end",
            "agent_end",
        ]
    );
}

#[tokio::test]
async fn request_pipeline_applies_hooks_and_request_fields() {
    let (runner, client) = test_runner(ProviderScenario::TextOnly);
    let convert_calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&convert_calls);
    let request = RunRequest::new(
        TEST_MODEL,
        vec![AgentMessage::custom("note", serde_json::json!({ "ui": true }))],
    )
    .with_system_prompt("be brief")
    .with_session_id("session-1")
    .with_transform_context(Arc::new(|mut messages: Vec<Message>| {
        Box::pin(async move {
            messages.insert(0, Message::user("injected"));
            messages
        })
    }))
    .with_api_key_resolver(Arc::new(|provider: String| {
        Box::pin(async move { Some(format!("key-for-{provider}")) })
    }));

    runner
        .run(prompt("hello"), request.clone(), CancellationToken::new())
        .await;

    let sent = &client.requests()[0];
    assert_eq!(sent.model, TEST_MODEL);
    assert_eq!(sent.system_prompt.as_deref(), Some("be brief"));
    assert_eq!(sent.session_id.as_deref(), Some("session-1"));
    assert_eq!(sent.api_key.as_deref(), Some("key-for-stub"));
    // custom note dropped by the default conversion, transform prepends
    let texts: Vec<String> = sent.messages.iter().map(Message::text).collect();
    assert_eq!(texts, vec!["injected", "hello"]);

    let (runner, client) = test_runner(ProviderScenario::TextOnly);
    let request = request.with_convert_to_llm(Arc::new(move |messages: Vec<AgentMessage>| {
        seen.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            messages
                .iter()
                .map(|message| match message {
                    AgentMessage::Llm(inner) => inner.clone(),
                    AgentMessage::Custom { kind, .. } => Message::user(format!("[{kind}]")),
                })
                .collect()
        })
    }));
    runner
        .run(prompt("hello"), request, CancellationToken::new())
        .await;
    assert_eq!(convert_calls.load(Ordering::SeqCst), 1);
    let texts: Vec<String> = client.requests()[0]
        .messages
        .iter()
        .map(Message::text)
        .collect();
    assert_eq!(texts, vec!["injected", "[note]", "hello"]);
}

#[tokio::test]
async fn usage_and_thinking_reach_the_final_message() {
    let (runner, _client) = scripted_runner(vec![ScriptedTurn::Chunks(vec![
        ProviderChunk::thinking("let me see"),
        ProviderChunk::text("answer"),
        ProviderChunk::Usage {
            usage: crate::types::Usage::new(12, 3),
        },
        ProviderChunk::finish(crate::provider::FinishReason::Stop),
    ])]);

    let result = runner
        .run(
            prompt("hello"),
            RunRequest::new(TEST_MODEL, Vec::new()),
            CancellationToken::new(),
        )
        .await;

    let assistant = result.messages[1].as_assistant().expect("assistant");
    assert_eq!(assistant.thinking_text(), "let me see");
    assert_eq!(assistant.text(), "answer");
    assert_eq!(assistant.usage.input, 12);
    assert_eq!(assistant.usage.output, 3);
    assert_eq!(assistant.provider, "stub");
}
