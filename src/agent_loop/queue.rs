//! Steering and follow-up message queues.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::agent::message::AgentMessage;

/// How many queued messages a single poll drains.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum QueueMode {
    /// Each poll yields only the oldest message.
    #[default]
    OneAtATime,
    /// Each poll drains the whole queue.
    All,
}

#[derive(Debug, Default)]
struct QueueInner {
    messages: VecDeque<AgentMessage>,
    mode: QueueMode,
}

/// FIFO shared between the caller (push) and the loop (poll).
///
/// Cloning shares the same queue.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl MessageQueue {
    pub fn new(mode: QueueMode) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                messages: VecDeque::new(),
                mode,
            })),
        }
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut QueueInner) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn push(&self, message: AgentMessage) {
        self.with_inner(|inner| inner.messages.push_back(message));
    }

    /// Drain according to the current mode. Never blocks; empty when idle.
    pub fn poll(&self) -> Vec<AgentMessage> {
        self.with_inner(|inner| match inner.mode {
            QueueMode::All => inner.messages.drain(..).collect(),
            QueueMode::OneAtATime => inner.messages.pop_front().into_iter().collect(),
        })
    }

    pub fn clear(&self) {
        self.with_inner(|inner| inner.messages.clear());
    }

    pub fn len(&self) -> usize {
        self.with_inner(|inner| inner.messages.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mode(&self) -> QueueMode {
        self.with_inner(|inner| inner.mode)
    }

    pub fn set_mode(&self, mode: QueueMode) {
        self.with_inner(|inner| inner.mode = mode);
    }
}
