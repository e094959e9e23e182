//! Generation options and related enums.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default cap for server-requested retry delays.
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Why an assistant message stopped.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    #[default]
    Stop,
    ToolUse,
    Length,
    Error,
    Aborted,
    /// Provider content filter tripped.
    Sensitive,
}

impl StopReason {
    /// `Error` and `Aborted` end the run.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Aborted)
    }
}

/// Reasoning level requested from the model.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ThinkingLevel {
    #[default]
    Off,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

/// Token budgets for each thinking level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThinkingBudgets {
    pub minimal: u32,
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl Default for ThinkingBudgets {
    fn default() -> Self {
        Self {
            minimal: 1024,
            low: 2048,
            medium: 8192,
            high: 16384,
        }
    }
}

impl ThinkingBudgets {
    /// Token budget for a level; `Xhigh` shares the `high` budget.
    pub fn budget_for(&self, level: ThinkingLevel) -> Option<u32> {
        match level {
            ThinkingLevel::Off => None,
            ThinkingLevel::Minimal => Some(self.minimal),
            ThinkingLevel::Low => Some(self.low),
            ThinkingLevel::Medium => Some(self.medium),
            ThinkingLevel::High | ThinkingLevel::Xhigh => Some(self.high),
        }
    }
}

/// Options forwarded to the model client on every generation call.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    /// `None` or `Off` disables reasoning.
    pub reasoning: Option<ThinkingLevel>,
    pub thinking_budgets: Option<ThinkingBudgets>,
    /// Cap for server-requested retry delays; `0` disables the cap.
    #[builder(default = DEFAULT_MAX_RETRY_DELAY_MS)]
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_max_retry_delay_ms() -> u64 {
    DEFAULT_MAX_RETRY_DELAY_MS
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: None,
            reasoning: None,
            thinking_budgets: None,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
        }
    }
}

impl GenerationOptions {
    /// Thinking token budget implied by `reasoning` and `thinking_budgets`.
    pub fn thinking_budget(&self) -> Option<u32> {
        let level = self.reasoning?;
        self.thinking_budgets.unwrap_or_default().budget_for(level)
    }
}
