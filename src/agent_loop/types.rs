//! Core run types for the agent loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::message::AgentMessage;
use crate::types::StopReason;

/// Unique run identifier.
pub type RunId = Uuid;

/// Final run status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Aborted,
}

impl RunStatus {
    /// Status implied by the last assistant message's stop reason.
    pub fn from_stop_reason(reason: StopReason) -> Self {
        match reason {
            StopReason::Error => Self::Failed,
            StopReason::Aborted => Self::Aborted,
            _ => Self::Completed,
        }
    }
}

/// Result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Messages added during the run, prompts included.
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn completed(run_id: RunId, messages: Vec<AgentMessage>) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            messages,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(run_id: RunId, error: impl Into<String>, messages: Vec<AgentMessage>) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            messages,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }

    pub fn aborted(run_id: RunId, messages: Vec<AgentMessage>) -> Self {
        Self {
            run_id,
            status: RunStatus::Aborted,
            messages,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
