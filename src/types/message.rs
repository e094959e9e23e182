//! Conversation messages exchanged with the model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::{
    AssistantContent, ImageContent, TextContent, ThinkingContent, ToolCall, UserContent,
};
use super::generation::StopReason;
use super::usage::Usage;

/// A message in a conversation, tagged by `role`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    ToolResult(ToolResultMessage),
}

impl Message {
    /// Shorthand: a user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User(UserMessage::text(text))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::User(m) => m.timestamp,
            Self::Assistant(m) => m.timestamp,
            Self::ToolResult(m) => m.timestamp,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResultMessage> {
        match self {
            Self::ToolResult(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Self::Assistant(_))
    }

    /// Concatenated text of the message.
    pub fn text(&self) -> String {
        match self {
            Self::User(m) => super::content::user_content_text(&m.content),
            Self::Assistant(m) => m.text(),
            Self::ToolResult(m) => super::content::user_content_text(&m.content),
        }
    }
}

/// Input authored by the user (or injected by the caller).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserMessage {
    pub content: Vec<UserContent>,
    pub timestamp: DateTime<Utc>,
}

impl UserMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![UserContent::text(text)],
            timestamp: Utc::now(),
        }
    }

    pub fn with_images(text: impl Into<String>, images: Vec<ImageContent>) -> Self {
        let mut content = vec![UserContent::text(text)];
        content.extend(images.into_iter().map(UserContent::Image));
        Self {
            content,
            timestamp: Utc::now(),
        }
    }
}

/// A model response. Blocks are appended while streaming, never removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    pub content: Vec<AssistantContent>,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub usage: Usage,
    pub stop_reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AssistantMessage {
    /// Empty in-flight message for a provider/model pair.
    pub fn empty(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: Vec::new(),
            provider: provider.into(),
            model: model.into(),
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                AssistantContent::Text(TextContent { text, .. }) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn thinking_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                AssistantContent::Thinking(ThinkingContent { thinking, .. }) => {
                    Some(thinking.as_str())
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                AssistantContent::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, AssistantContent::ToolCall(_)))
    }

    /// Whether generation ended in error or cancellation.
    pub fn is_terminal_failure(&self) -> bool {
        self.stop_reason.is_failure()
    }
}

/// Result of one tool call, fed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultMessage {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: Vec<UserContent>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

impl ToolResultMessage {
    /// Text-only error result.
    pub fn error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: vec![UserContent::text(text)],
            details: serde_json::json!({}),
            is_error: true,
            timestamp: Utc::now(),
        }
    }
}

impl From<UserMessage> for Message {
    fn from(value: UserMessage) -> Self {
        Self::User(value)
    }
}

impl From<AssistantMessage> for Message {
    fn from(value: AssistantMessage) -> Self {
        Self::Assistant(value)
    }
}

impl From<ToolResultMessage> for Message {
    fn from(value: ToolResultMessage) -> Self {
        Self::ToolResult(value)
    }
}
