//! Runner interfaces for the agent loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::message::AgentMessage;
use crate::error::HelmError;
use crate::provider::ModelClient;
use crate::stream::EventStream;
use crate::tools::ToolRegistry;
use crate::types::{GenerationOptions, Message};

use super::events::{AgentEvent, AgentEventStream};
use super::types::{RunId, RunResult};

/// Async callback to retrieve messages between loop phases.
pub type MessageBatchFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Vec<AgentMessage>> + Send>> + Send + Sync>;

/// Callback to retrieve steering messages (after each tool call and each turn).
pub type SteeringMessagesFn = MessageBatchFn;

/// Callback to retrieve follow-up messages once the agent would stop.
pub type FollowUpMessagesFn = MessageBatchFn;

/// Hook to convert/filter agent-level messages into model-facing messages.
///
/// Runs before `transform_context`. Without it, custom messages are dropped.
pub type ConvertToLlmFn = Arc<
    dyn Fn(Vec<AgentMessage>) -> Pin<Box<dyn Future<Output = Vec<Message>> + Send>>
        + Send
        + Sync,
>;

/// Hook to transform the model context before each generation call.
pub type TransformContextFn = Arc<
    dyn Fn(Vec<Message>) -> Pin<Box<dyn Future<Output = Vec<Message>> + Send>> + Send + Sync,
>;

/// Resolves an API key for a provider name right before each call.
pub type ApiKeyFn = Arc<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = Option<String>> + Send>> + Send + Sync,
>;

/// Sink receiving every [`AgentEvent`] in emission order.
pub type AgentEventSink = Arc<dyn Fn(AgentEvent) + Send + Sync>;

/// Request payload to start a run.
#[derive(Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    pub model: String,
    pub system_prompt: Option<String>,
    /// Existing conversation context. Prompts are appended to it.
    pub messages: Vec<AgentMessage>,
    pub tools: Arc<ToolRegistry>,
    pub options: GenerationOptions,
    /// Optional session ID for provider-side prompt caching.
    pub session_id: Option<String>,
    pub get_steering_messages: Option<SteeringMessagesFn>,
    pub get_follow_up_messages: Option<FollowUpMessagesFn>,
    pub convert_to_llm: Option<ConvertToLlmFn>,
    pub transform_context: Option<TransformContextFn>,
    pub get_api_key: Option<ApiKeyFn>,
    pub agent_event_sink: Option<AgentEventSink>,
}

impl RunRequest {
    pub fn new(model: impl Into<String>, messages: Vec<AgentMessage>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            model: model.into(),
            system_prompt: None,
            messages,
            tools: Arc::new(ToolRegistry::new()),
            options: GenerationOptions::default(),
            session_id: None,
            get_steering_messages: None,
            get_follow_up_messages: None,
            convert_to_llm: None,
            transform_context: None,
            get_api_key: None,
            agent_event_sink: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_steering_messages(mut self, f: SteeringMessagesFn) -> Self {
        self.get_steering_messages = Some(f);
        self
    }

    pub fn with_follow_up_messages(mut self, f: FollowUpMessagesFn) -> Self {
        self.get_follow_up_messages = Some(f);
        self
    }

    pub fn with_convert_to_llm(mut self, f: ConvertToLlmFn) -> Self {
        self.convert_to_llm = Some(f);
        self
    }

    pub fn with_transform_context(mut self, f: TransformContextFn) -> Self {
        self.transform_context = Some(f);
        self
    }

    pub fn with_api_key_resolver(mut self, f: ApiKeyFn) -> Self {
        self.get_api_key = Some(f);
        self
    }

    pub fn with_agent_event_sink(mut self, sink: AgentEventSink) -> Self {
        self.agent_event_sink = Some(sink);
        self
    }
}

impl std::fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRequest")
            .field("run_id", &self.run_id)
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("tools", &self.tools)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Default agent-loop runner: generation turns, sequential tools, queues.
#[derive(Clone)]
pub struct LoopRunner {
    client: Arc<dyn ModelClient>,
}

mod control;
mod engine;
mod message_events;
mod tooling;

use control::debug_enabled;

impl LoopRunner {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn ModelClient> {
        &self.client
    }

    /// Run to completion with `prompts` appended to the request context.
    ///
    /// Events go to the request's `agent_event_sink`. Generation failures and
    /// cancellation are reported through the [`RunResult`], never as `Err`.
    pub async fn run(
        &self,
        prompts: Vec<AgentMessage>,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> RunResult {
        if debug_enabled() {
            tracing::debug!(
                run_id = %request.run_id,
                model = %request.model,
                prompts = prompts.len(),
                "helm run start"
            );
        }
        engine::drive_run(Arc::clone(&self.client), prompts, request, cancel).await
    }

    /// Resume from the current context without a new prompt.
    ///
    /// The context must be non-empty and must not end with an assistant
    /// message.
    pub async fn continue_run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunResult, HelmError> {
        validate_continue(&request.messages)?;
        Ok(self.run(Vec::new(), request, cancel).await)
    }

    /// Spawn a run and return its event stream. The stream resolves to the
    /// [`RunResult`] after `agent_end`.
    pub fn start(
        &self,
        prompts: Vec<AgentMessage>,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> AgentEventStream {
        let (sink, stream) = EventStream::channel();
        let upstream = request.agent_event_sink.clone();
        let forward = sink.clone();
        let request = request.with_agent_event_sink(Arc::new(move |event: AgentEvent| {
            if let Some(upstream) = upstream.as_ref() {
                upstream(event.clone());
            }
            forward.push(event);
        }));
        let runner = self.clone();
        tokio::spawn(async move {
            let result = runner.run(prompts, request, cancel).await;
            sink.end(result);
        });
        stream
    }

    /// Streaming variant of [`continue_run`](Self::continue_run).
    pub fn start_continue(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<AgentEventStream, HelmError> {
        validate_continue(&request.messages)?;
        Ok(self.start(Vec::new(), request, cancel))
    }
}

impl std::fmt::Debug for LoopRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopRunner")
            .field("provider", &self.client.provider_name())
            .finish()
    }
}

fn validate_continue(messages: &[AgentMessage]) -> Result<(), HelmError> {
    match messages.last() {
        None => Err(HelmError::InvalidState(
            "Cannot continue: no messages in context".to_string(),
        )),
        Some(last) if last.is_assistant() => Err(HelmError::InvalidState(
            "Cannot continue from message role: assistant".to_string(),
        )),
        Some(_) => Ok(()),
    }
}

/// Start an agent loop with new prompt messages.
pub fn agent_loop(
    client: Arc<dyn ModelClient>,
    prompts: Vec<AgentMessage>,
    request: RunRequest,
    cancel: CancellationToken,
) -> AgentEventStream {
    LoopRunner::new(client).start(prompts, request, cancel)
}

/// Continue an agent loop from the current context.
pub fn agent_loop_continue(
    client: Arc<dyn ModelClient>,
    request: RunRequest,
    cancel: CancellationToken,
) -> Result<AgentEventStream, HelmError> {
    LoopRunner::new(client).start_continue(request, cancel)
}

#[cfg(test)]
mod tests;
