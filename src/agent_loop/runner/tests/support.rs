use super::*;

use std::sync::Mutex;

use crate::agent_loop::queue::MessageQueue;
use crate::provider::{FinishReason, ProviderChunk, ScriptedClient, ScriptedTurn};
use crate::tools::{AgentTool, AgentToolParameters, AgentToolResult, Tool};

pub(super) const TEST_MODEL: &str = "stub-model";

#[derive(Clone, Copy)]
pub(super) enum ProviderScenario {
    /// Text "done", then stop.
    TextOnly,
    /// One `echo` call on turn 1, text "done" on turn 2.
    ToolThenText,
    /// Two `echo` calls on turn 1, text "done" on turn 2.
    TwoToolsThenText,
    /// `echo` call with an unparseable argument buffer, then text.
    MalformedArgsThenText,
    /// Call to a tool nobody registered, then text.
    UnknownToolThenText,
    /// Text "partial", then a stream error.
    TextThenStreamError,
    /// Text "partial", then nothing ever again.
    StallAfterText,
}

impl ProviderScenario {
    pub(super) fn turns(self) -> Vec<ScriptedTurn> {
        let echo = |id: &'static str, text: &str| (id, "echo", serde_json::json!({ "text": text }));
        match self {
            Self::TextOnly => vec![ScriptedTurn::text("done")],
            Self::ToolThenText => vec![
                ScriptedTurn::tool_calls([echo("call_1", "hi")]),
                ScriptedTurn::text("done"),
            ],
            Self::TwoToolsThenText => vec![
                ScriptedTurn::tool_calls([echo("call_1", "first"), echo("call_2", "second")]),
                ScriptedTurn::text("done"),
            ],
            Self::MalformedArgsThenText => vec![
                ScriptedTurn::Chunks(vec![
                    ProviderChunk::tool_call("call_1", "echo", r#"{"text": "#),
                    ProviderChunk::finish(FinishReason::ToolCalls),
                ]),
                ScriptedTurn::text("done"),
            ],
            Self::UnknownToolThenText => vec![
                ScriptedTurn::tool_calls([("call_1", "missing", serde_json::json!({}))]),
                ScriptedTurn::text("done"),
            ],
            Self::TextThenStreamError => vec![ScriptedTurn::FailAfter {
                chunks: vec![ProviderChunk::text("partial")],
                message: "connection reset".to_string(),
            }],
            Self::StallAfterText => vec![ScriptedTurn::Stall(vec![ProviderChunk::text("partial")])],
        }
    }
}

pub(super) fn test_runner(scenario: ProviderScenario) -> (LoopRunner, Arc<ScriptedClient>) {
    scripted_runner(scenario.turns())
}

pub(super) fn scripted_runner(turns: Vec<ScriptedTurn>) -> (LoopRunner, Arc<ScriptedClient>) {
    let client = Arc::new(ScriptedClient::new(turns).with_provider_name("stub"));
    let runner = LoopRunner::new(client.clone());
    (runner, client)
}

pub(super) fn capture_agent_events() -> (AgentEventSink, Arc<Mutex<Vec<AgentEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&events);
    let sink: AgentEventSink = Arc::new(move |event| {
        captured.lock().expect("agent event lock").push(event);
    });
    (sink, events)
}

pub(super) fn queue_source(queue: &MessageQueue) -> MessageBatchFn {
    let queue = queue.clone();
    Arc::new(move || {
        let messages = queue.poll();
        Box::pin(async move { messages })
    })
}

pub(super) fn registry(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::from_tools(tools).expect("tool registry"))
}

pub(super) fn echo_parameters() -> AgentToolParameters {
    AgentToolParameters::object()
        .string("text", "text to echo", true)
        .build()
}

/// Returns `echo: <text>` and counts invocations.
pub(super) fn echo_tool(calls: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "echo",
        "echo the text argument",
        echo_parameters(),
        move |args, _ctx| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let text = args.get_str("text")?.to_string();
                Ok(AgentToolResult::text(format!("echo: {text}")))
            }
        },
    ))
}

pub(super) fn event_kinds(events: &[AgentEvent]) -> Vec<&'static str> {
    events.iter().map(AgentEvent::kind).collect()
}

/// Kinds with streaming updates dropped.
pub(super) fn lifecycle_kinds(events: &[AgentEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter(|event| !matches!(event, AgentEvent::MessageUpdate { .. }))
        .map(AgentEvent::kind)
        .collect()
}

pub(super) fn message_kinds(messages: &[AgentMessage]) -> Vec<String> {
    messages.iter().map(|m| m.kind().to_string()).collect()
}

/// agent_start first, agent_end last, message events never interleave.
pub(super) fn assert_event_invariants(events: &[AgentEvent]) {
    assert!(
        matches!(events.first(), Some(AgentEvent::AgentStart { .. })),
        "first event must be agent_start: {:?}",
        event_kinds(events)
    );
    assert!(
        matches!(events.last(), Some(AgentEvent::AgentEnd { .. })),
        "last event must be agent_end: {:?}",
        event_kinds(events)
    );
    let agent_ends = events
        .iter()
        .filter(|event| matches!(event, AgentEvent::AgentEnd { .. }))
        .count();
    assert_eq!(agent_ends, 1);

    let mut open = false;
    let mut turn_open = false;
    for event in events {
        match event {
            AgentEvent::MessageStart { .. } => {
                assert!(!open, "message_start while another message is open");
                open = true;
            }
            AgentEvent::MessageUpdate { .. } => assert!(open, "message_update outside a message"),
            AgentEvent::MessageEnd { .. } => {
                assert!(open, "message_end without message_start");
                open = false;
            }
            AgentEvent::TurnStart { .. } => {
                assert!(!turn_open, "nested turn_start");
                turn_open = true;
            }
            AgentEvent::TurnEnd { .. } => {
                assert!(turn_open, "turn_end without turn_start");
                turn_open = false;
            }
            _ => {}
        }
    }
    assert!(!open, "message left open");
    assert!(!turn_open, "turn left open");
}

/// Every tool call in the log has exactly one matching result.
pub(super) fn assert_tool_results_paired(messages: &[AgentMessage]) {
    for (idx, message) in messages.iter().enumerate() {
        let Some(assistant) = message.as_assistant() else {
            continue;
        };
        for call in assistant.tool_calls() {
            let matching = messages[idx + 1..]
                .iter()
                .filter_map(AgentMessage::as_tool_result)
                .filter(|result| result.tool_call_id == call.id)
                .count();
            assert_eq!(matching, 1, "tool call {} needs exactly one result", call.id);
        }
    }
}
