//! Model client contract.
//!
//! A [`ModelClient`] streams raw [`ProviderChunk`]s for one generation call.
//! The stream adapter turns those chunks into canonical assistant events.

pub mod mock;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::HelmError;
use crate::types::{GenerationOptions, Message, Usage};

pub use mock::{ScriptedClient, ScriptedTurn};

/// Tool definition sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Everything a client needs for one generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub options: GenerationOptions,
    /// Session id for provider-side prompt caching.
    pub session_id: Option<String>,
    pub api_key: Option<String>,
}

/// Provider finish marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// Raw chunk emitted by a model client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderChunk {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Fragment of a tool call. `id` and `name` are usually present only on
    /// the first fragment of a call; argument text arrives in pieces.
    ToolCallDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        arguments: String,
    },
    Usage {
        usage: Usage,
    },
    Finish {
        reason: FinishReason,
    },
    Error {
        message: String,
    },
}

impl ProviderChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self::ThinkingDelta {
            text: text.into(),
            signature: None,
        }
    }

    /// Opening fragment of a tool call.
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::ToolCallDelta {
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: arguments.into(),
        }
    }

    /// Continuation fragment for the open tool call.
    pub fn tool_args(arguments: impl Into<String>) -> Self {
        Self::ToolCallDelta {
            id: None,
            name: None,
            arguments: arguments.into(),
        }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self::Finish { reason }
    }
}

/// Boxed stream of provider chunks.
pub type ChunkStream = BoxStream<'static, Result<ProviderChunk, HelmError>>;

/// Streaming model backend.
///
/// Implementations should observe `cancel` where they can; the adapter also
/// stops polling the stream once the token trips.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider name (e.g. "anthropic").
    fn provider_name(&self) -> &str;

    /// Start a streaming generation.
    async fn stream(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, HelmError>;
}
