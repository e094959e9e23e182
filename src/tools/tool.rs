//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::types::{AgentToolParameters, AgentToolResult};
use crate::error::HelmError;

/// Callback for streaming partial tool results during execution.
pub type ToolUpdateCallback = Arc<dyn Fn(AgentToolResult) + Send + Sync>;

/// Context handed to a tool for one call.
#[derive(Clone)]
pub struct ToolExecutionContext {
    pub tool_call_id: String,
    /// Trips when the run is aborted. Tools should stop cooperatively.
    pub cancel: CancellationToken,
    pub on_update: Option<ToolUpdateCallback>,
}

impl ToolExecutionContext {
    pub fn new(tool_call_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            cancel,
            on_update: None,
        }
    }

    pub fn with_update_callback(mut self, on_update: ToolUpdateCallback) -> Self {
        self.on_update = Some(on_update);
        self
    }

    /// Report a partial result. Dropped if nobody listens.
    pub fn emit_update(&self, partial: AgentToolResult) {
        if let Some(callback) = self.on_update.as_ref() {
            callback(partial);
        }
    }
}

impl std::fmt::Debug for ToolExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutionContext")
            .field("tool_call_id", &self.tool_call_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("on_update", &self.on_update.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Core tool trait -- implement to create custom tools.
///
/// Errors returned from [`execute`](Tool::execute) become error tool results
/// for the model; they never end the run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable label for UI display. Defaults to [`name`](Tool::name).
    fn label(&self) -> &str {
        self.name()
    }

    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &AgentToolParameters;

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<AgentToolResult, HelmError>;
}

type ToolHandler = dyn Fn(
        ToolArguments,
        ToolExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<AgentToolResult, HelmError>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct AgentTool {
    name: String,
    label: Option<String>,
    description: String,
    parameters: AgentToolParameters,
    handler: Arc<ToolHandler>,
}

impl AgentTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: AgentToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AgentToolResult, HelmError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            label: None,
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<AgentToolResult, HelmError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
