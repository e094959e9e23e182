//! Error types for helm.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad classification of a [`HelmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Model generation failed; ends the run.
    Generation,
    /// Run was cancelled by the caller; ends the run.
    Cancellation,
    /// A single tool call failed; recorded as an error result.
    Tool,
    /// Caller used the API incorrectly (busy agent, bad continuation).
    Misuse,
    Configuration,
    Serialization,
}

/// Primary error type for all helm operations.
#[derive(Error, Debug)]
pub enum HelmError {
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Request was aborted")]
    Aborted,

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Agent is already processing a prompt. Use steer() or follow_up() to queue messages, or wait for completion.")]
    Busy,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HelmError {
    /// Convenience constructor for tool failures.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Stream(_) | Self::RateLimited { .. } => ErrorCategory::Generation,
            Self::Aborted => ErrorCategory::Cancellation,
            Self::ToolExecution { .. } | Self::ToolNotFound(_) | Self::InvalidArgument(_) => {
                ErrorCategory::Tool
            }
            Self::Busy | Self::InvalidState(_) => ErrorCategory::Misuse,
            Self::Configuration(_) | Self::Io(_) | Self::TomlParse(_) => {
                ErrorCategory::Configuration
            }
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    /// Whether this error terminates a run when raised during generation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Generation | ErrorCategory::Cancellation
        )
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, HelmError>;
