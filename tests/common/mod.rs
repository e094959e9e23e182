//! Shared test helpers: scripted agents and event capture.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use helm::agent::Agent;
use helm::agent_loop::AgentEvent;
use helm::config::AgentConfig;
use helm::provider::{ScriptedClient, ScriptedTurn};
use helm::tools::{AgentTool, AgentToolParameters, AgentToolResult, Tool, ToolRegistry};

pub const TEST_MODEL: &str = "stub-model";

/// Agent backed by a [`ScriptedClient`] named `stub`.
pub fn scripted_agent(turns: Vec<ScriptedTurn>) -> (Arc<Agent>, Arc<ScriptedClient>) {
    let client = Arc::new(ScriptedClient::new(turns).with_provider_name("stub"));
    let config = AgentConfig::builder().model(TEST_MODEL).build();
    let agent = Arc::new(Agent::new(client.clone(), config));
    (agent, client)
}

/// Subscribe a recorder and return the shared event log.
pub fn record_events(agent: &Agent) -> Arc<Mutex<Vec<AgentEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    agent.subscribe(move |event| {
        sink.lock().expect("event log lock").push(event.clone());
    });
    events
}

pub fn kinds(events: &[AgentEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter(|event| !matches!(event, AgentEvent::MessageUpdate { .. }))
        .map(AgentEvent::kind)
        .collect()
}

/// `echo` tool returning `echo: <text>`.
pub fn echo_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "echo",
        "echo the text argument",
        AgentToolParameters::object()
            .string("text", "text to echo", true)
            .build(),
        |args, _ctx| async move {
            let text = args.get_str("text")?.to_string();
            Ok(AgentToolResult::text(format!("echo: {text}")))
        },
    ))
}

pub fn registry(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::from_tools(tools).expect("tool registry"))
}

/// message_start/message_end pairs never interleave; agent_start first,
/// agent_end last and unique.
pub fn assert_well_ordered(events: &[AgentEvent]) {
    assert!(matches!(events.first(), Some(AgentEvent::AgentStart { .. })));
    assert!(matches!(events.last(), Some(AgentEvent::AgentEnd { .. })));
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, AgentEvent::AgentEnd { .. }))
            .count(),
        1
    );
    let mut open = false;
    for event in events {
        match event {
            AgentEvent::MessageStart { .. } => {
                assert!(!open, "interleaved message_start");
                open = true;
            }
            AgentEvent::MessageUpdate { .. } => assert!(open),
            AgentEvent::MessageEnd { .. } => {
                assert!(open, "message_end without start");
                open = false;
            }
            _ => {}
        }
    }
    assert!(!open);
}
