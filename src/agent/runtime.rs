//! High-level Agent runtime wrapping the agent loop.
//!
//! - [`Agent::prompt`] starts a run from a user prompt
//! - [`Agent::continue_run`] retries from the current context
//! - [`Agent::steer`] queues a message that interrupts the current tool batch
//! - [`Agent::follow_up`] queues a message processed after natural completion
//! - [`Agent::abort`] cancels the current run
//! - [`Agent::reset`] clears conversation, queues, and run state
//! - [`Agent::wait_for_idle`] waits until the active run finishes
//! - [`Agent::subscribe`] observes every [`AgentEvent`] after state is updated

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::agent::message::AgentMessage;
use crate::agent::state::AgentState;
use crate::agent_loop::runner::{
    AgentEventSink, ApiKeyFn, ConvertToLlmFn, MessageBatchFn, TransformContextFn,
};
use crate::agent_loop::{AgentEvent, LoopRunner, MessageQueue, QueueMode, RunRequest, RunResult};
use crate::config::AgentConfig;
use crate::error::HelmError;
use crate::provider::ModelClient;
use crate::tools::ToolRegistry;
use crate::types::{ImageContent, ThinkingLevel};

/// Observer callback; called synchronously, in emission order.
pub type AgentListener = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

/// Handle returned by [`Agent::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, AgentListener)>,
}

impl Listeners {
    fn snapshot(&self) -> Vec<AgentListener> {
        self.entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stateful agent: conversation log, queues, subscribers, and at most one
/// active run.
///
/// All methods take `&self`; share an agent across tasks with `Arc<Agent>`.
///
/// # Example
///
/// ```ignore
/// let agent = Agent::new(client, AgentConfig::from_env()?);
/// agent.subscribe(|event| println!("{}", event.kind()));
/// let result = agent.prompt("Hello").await?;
/// agent.follow_up(AgentMessage::user("and then?"));
/// ```
pub struct Agent {
    runner: LoopRunner,
    config: AgentConfig,
    state: Arc<Mutex<AgentState>>,
    listeners: Arc<Mutex<Listeners>>,
    steering_queue: MessageQueue,
    follow_up_queue: MessageQueue,
    active_run: Mutex<Option<CancellationToken>>,
    idle_notify: Notify,
    convert_to_llm: Option<ConvertToLlmFn>,
    transform_context: Option<TransformContextFn>,
    get_api_key: Option<ApiKeyFn>,
}

impl Agent {
    pub fn new(client: Arc<dyn ModelClient>, config: AgentConfig) -> Self {
        let mut state = AgentState::new(config.model.clone());
        state.system_prompt = config.system_prompt.clone();
        state.thinking_level = config.thinking_level;
        Self {
            runner: LoopRunner::new(client),
            steering_queue: MessageQueue::new(config.steering_mode),
            follow_up_queue: MessageQueue::new(config.follow_up_mode),
            config,
            state: Arc::new(Mutex::new(state)),
            listeners: Arc::new(Mutex::new(Listeners::default())),
            active_run: Mutex::new(None),
            idle_notify: Notify::new(),
            convert_to_llm: None,
            transform_context: None,
            get_api_key: None,
        }
    }

    pub fn with_tools(self, tools: Arc<ToolRegistry>) -> Self {
        lock(&self.state).tools = tools;
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

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Point-in-time copy of the observable state.
    pub fn state(&self) -> AgentState {
        lock(&self.state).clone()
    }

    pub fn messages(&self) -> Vec<AgentMessage> {
        lock(&self.state).messages.clone()
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.state).is_streaming
    }

    /// Register an observer. Listeners see each event after the agent state
    /// has absorbed it.
    pub fn subscribe(&self, listener: impl Fn(&AgentEvent) + Send + Sync + 'static) -> ListenerId {
        let mut listeners = lock(&self.listeners);
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _)| *entry != id);
        listeners.entries.len() != before
    }

    // -- Mutators (idle only) --

    /// # Errors
    ///
    /// Returns [`HelmError::InvalidState`] if a run is active.
    pub fn set_system_prompt(&self, prompt: impl Into<String>) -> Result<(), HelmError> {
        let prompt = prompt.into();
        self.mutate_idle(|state| state.system_prompt = Some(prompt))
    }

    pub fn clear_system_prompt(&self) -> Result<(), HelmError> {
        self.mutate_idle(|state| state.system_prompt = None)
    }

    pub fn set_model(&self, model: impl Into<String>) -> Result<(), HelmError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(HelmError::InvalidArgument("model must not be empty".into()));
        }
        self.mutate_idle(|state| state.model = model)
    }

    pub fn set_thinking_level(&self, level: ThinkingLevel) -> Result<(), HelmError> {
        self.mutate_idle(|state| state.thinking_level = level)
    }

    pub fn set_tools(&self, tools: Arc<ToolRegistry>) -> Result<(), HelmError> {
        self.mutate_idle(|state| state.tools = tools)
    }

    /// Replace the whole conversation log. Does not start a run.
    pub fn replace_messages(&self, messages: Vec<AgentMessage>) -> Result<(), HelmError> {
        self.mutate_idle(|state| state.messages = messages)
    }

    pub fn append_message(&self, message: AgentMessage) -> Result<(), HelmError> {
        self.mutate_idle(|state| state.messages.push(message))
    }

    pub fn clear_messages(&self) -> Result<(), HelmError> {
        self.mutate_idle(|state| state.messages.clear())
    }

    // -- Queues --

    /// Queue a message for the next poll point of the active (or next) run.
    ///
    /// During tool execution it skips the rest of the current batch.
    pub fn steer(&self, message: AgentMessage) {
        self.steering_queue.push(message);
    }

    /// Queue a message processed only once the agent would otherwise stop.
    pub fn follow_up(&self, message: AgentMessage) {
        self.follow_up_queue.push(message);
    }

    pub fn clear_steering_queue(&self) {
        self.steering_queue.clear();
    }

    pub fn clear_follow_up_queue(&self) {
        self.follow_up_queue.clear();
    }

    pub fn clear_queues(&self) {
        self.steering_queue.clear();
        self.follow_up_queue.clear();
    }

    pub fn has_queued_messages(&self) -> bool {
        !self.steering_queue.is_empty() || !self.follow_up_queue.is_empty()
    }

    pub fn set_steering_mode(&self, mode: QueueMode) {
        self.steering_queue.set_mode(mode);
    }

    pub fn set_follow_up_mode(&self, mode: QueueMode) {
        self.follow_up_queue.set_mode(mode);
    }

    pub fn steering_mode(&self) -> QueueMode {
        self.steering_queue.mode()
    }

    pub fn follow_up_mode(&self) -> QueueMode {
        self.follow_up_queue.mode()
    }

    // -- Runs --

    /// Run the agent on a user text prompt.
    ///
    /// # Errors
    ///
    /// Returns [`HelmError::Busy`] if a run is already active. Generation
    /// failures and aborts are reported through the [`RunResult`].
    pub async fn prompt(&self, text: impl Into<String>) -> Result<RunResult, HelmError> {
        self.prompt_messages(vec![AgentMessage::user(text)]).await
    }

    pub async fn prompt_with_images(
        &self,
        text: impl Into<String>,
        images: Vec<ImageContent>,
    ) -> Result<RunResult, HelmError> {
        self.prompt_messages(vec![AgentMessage::user_with_images(text, images)])
            .await
    }

    /// Run the agent with one or more prompt messages.
    pub async fn prompt_messages(
        &self,
        prompts: Vec<AgentMessage>,
    ) -> Result<RunResult, HelmError> {
        if prompts.is_empty() {
            return Err(HelmError::InvalidArgument(
                "prompt requires at least one message".into(),
            ));
        }
        let run = self.begin_run()?;
        let request = self.build_request();
        let result = self.runner.run(prompts, request, run.cancel.clone()).await;
        run.finish(Some(&result));
        Ok(result)
    }

    /// Retry from the current context without adding a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`HelmError::Busy`] if a run is active, or
    /// [`HelmError::InvalidState`] if the log is empty or ends with an
    /// assistant message.
    pub async fn continue_run(&self) -> Result<RunResult, HelmError> {
        let run = self.begin_run()?;
        let request = self.build_request();
        match self.runner.continue_run(request, run.cancel.clone()).await {
            Ok(result) => {
                run.finish(Some(&result));
                Ok(result)
            }
            Err(err) => {
                run.finish(None);
                Err(err)
            }
        }
    }

    /// Cancel the active run.
    ///
    /// Returns `true` if this call signaled a run, `false` if the agent was
    /// idle or the run was already aborting.
    pub fn abort(&self) -> bool {
        let active = lock(&self.active_run);
        match active.as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                tracing::debug!("helm agent abort requested");
                true
            }
            _ => false,
        }
    }

    /// Abort any active run, wait for it, then clear conversation, queues,
    /// and run state. Model, prompt, and tools are kept.
    pub async fn reset(&self) {
        self.abort();
        self.wait_for_idle().await;
        lock(&self.state).clear_run_state();
        self.clear_queues();
    }

    /// Returns immediately when idle, otherwise once the active run ends.
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.idle_notify.notified();
            let idle = lock(&self.active_run).is_none();
            if idle {
                return;
            }
            notified.await;
        }
    }

    // -- Internal helpers --

    fn mutate_idle(&self, apply: impl FnOnce(&mut AgentState)) -> Result<(), HelmError> {
        let active = lock(&self.active_run);
        if active.is_some() {
            return Err(HelmError::InvalidState(
                "Agent is not idle; runtime mutation requires idle state".into(),
            ));
        }
        apply(&mut lock(&self.state));
        Ok(())
    }

    /// Idle -> running, checked and set under one lock.
    fn begin_run(&self) -> Result<ActiveRun<'_>, HelmError> {
        let mut active = lock(&self.active_run);
        if active.is_some() {
            return Err(HelmError::Busy);
        }
        let cancel = CancellationToken::new();
        *active = Some(cancel.clone());

        let mut state = lock(&self.state);
        state.is_streaming = true;
        state.stream_message = None;
        state.pending_tool_calls.clear();
        state.error = None;
        Ok(ActiveRun {
            agent: self,
            cancel,
            armed: true,
        })
    }

    fn finish_run(&self, result: Option<&RunResult>) {
        {
            let mut state = lock(&self.state);
            state.is_streaming = false;
            state.stream_message = None;
            state.pending_tool_calls.clear();
            if let Some(error) = result.and_then(|result| result.error.clone()) {
                state.error = Some(error);
            }
        }
        if let Some(result) = result {
            tracing::debug!(run_id = %result.run_id, status = ?result.status, "helm agent run finished");
        }
        lock(&self.active_run).take();
        self.idle_notify.notify_waiters();
    }

    fn build_request(&self) -> RunRequest {
        let state = self.state();
        let mut options = self.config.generation_options();
        options.reasoning = (state.thinking_level != ThinkingLevel::Off).then_some(state.thinking_level);

        let mut request = RunRequest::new(state.model, state.messages)
            .with_tools(state.tools)
            .with_options(options)
            .with_steering_messages(queue_source(&self.steering_queue))
            .with_follow_up_messages(queue_source(&self.follow_up_queue))
            .with_agent_event_sink(self.build_intercepting_sink());

        if let Some(prompt) = state.system_prompt {
            request = request.with_system_prompt(prompt);
        }
        if let Some(ref id) = self.config.session_id {
            request = request.with_session_id(id.clone());
        }
        if let Some(ref convert) = self.convert_to_llm {
            request = request.with_convert_to_llm(convert.clone());
        }
        if let Some(ref transform) = self.transform_context {
            request = request.with_transform_context(transform.clone());
        }
        if let Some(ref get_key) = self.get_api_key {
            request = request.with_api_key_resolver(get_key.clone());
        }
        request
    }

    /// Sink that folds each event into the state, then fans it out to a
    /// snapshot of the listeners so they may (un)subscribe re-entrantly.
    fn build_intercepting_sink(&self) -> AgentEventSink {
        let state = Arc::clone(&self.state);
        let listeners = Arc::clone(&self.listeners);
        Arc::new(move |event: AgentEvent| {
            lock(&state).apply(&event);
            let snapshot = lock(&listeners).snapshot();
            for listener in snapshot {
                listener(&event);
            }
        })
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("runner", &self.runner)
            .field("config", &self.config)
            .field("steering_queue", &self.steering_queue.len())
            .field("follow_up_queue", &self.follow_up_queue.len())
            .finish_non_exhaustive()
    }
}

/// Marks the agent busy for one run. Dropping it unfinished (the caller
/// dropped the run future, or a listener panicked) cancels the run and
/// returns the agent to idle.
struct ActiveRun<'a> {
    agent: &'a Agent,
    cancel: CancellationToken,
    armed: bool,
}

impl ActiveRun<'_> {
    fn finish(mut self, result: Option<&RunResult>) {
        self.armed = false;
        self.agent.finish_run(result);
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.cancel.cancel();
        tracing::debug!("helm agent run dropped before completion");
        self.agent.finish_run(None);
    }
}

fn queue_source(queue: &MessageQueue) -> MessageBatchFn {
    let queue = queue.clone();
    Arc::new(move || {
        let messages = queue.poll();
        Box::pin(async move { messages })
    })
}
