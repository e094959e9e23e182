//! Agent-level messages.
//!
//! The loop stores [`AgentMessage`] values in the conversation log. Standard
//! model messages travel in the `Llm` arm; `Custom` messages (UI artifacts,
//! notes, bookkeeping) stay in the log but are dropped by [`convert_to_llm`]
//! before each model call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AssistantMessage, ImageContent, Message, ToolResultMessage, UserMessage};

/// Default message type for the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Message sent to the model.
    Llm(Message),
    /// Message kept out of the model context.
    Custom {
        kind: String,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

impl AgentMessage {
    /// Shorthand: a user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::Llm(Message::user(text))
    }

    pub fn user_with_images(text: impl Into<String>, images: Vec<ImageContent>) -> Self {
        Self::Llm(Message::User(UserMessage::with_images(text, images)))
    }

    pub fn custom(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self::Custom {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn as_llm(&self) -> Option<&Message> {
        match self {
            Self::Llm(message) => Some(message),
            Self::Custom { .. } => None,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        self.as_llm().and_then(Message::as_assistant)
    }

    pub fn as_tool_result(&self) -> Option<&ToolResultMessage> {
        self.as_llm().and_then(Message::as_tool_result)
    }

    pub fn is_assistant(&self) -> bool {
        self.as_assistant().is_some()
    }

    /// `"user"`, `"assistant"`, `"tool_result"`, or the custom kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::Llm(Message::User(_)) => "user",
            Self::Llm(Message::Assistant(_)) => "assistant",
            Self::Llm(Message::ToolResult(_)) => "tool_result",
            Self::Custom { kind, .. } => kind,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Llm(message) => message.timestamp(),
            Self::Custom { timestamp, .. } => *timestamp,
        }
    }
}

impl From<Message> for AgentMessage {
    fn from(value: Message) -> Self {
        Self::Llm(value)
    }
}

impl From<AssistantMessage> for AgentMessage {
    fn from(value: AssistantMessage) -> Self {
        Self::Llm(Message::Assistant(value))
    }
}

impl From<ToolResultMessage> for AgentMessage {
    fn from(value: ToolResultMessage) -> Self {
        Self::Llm(Message::ToolResult(value))
    }
}

impl From<UserMessage> for AgentMessage {
    fn from(value: UserMessage) -> Self {
        Self::Llm(Message::User(value))
    }
}

/// Default conversion: keep model messages, drop custom ones.
pub fn convert_to_llm(messages: &[AgentMessage]) -> Vec<Message> {
    messages
        .iter()
        .filter_map(|m| m.as_llm().cloned())
        .collect()
}
