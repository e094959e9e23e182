//! Scripted model client for tests and offline demos.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::{ChunkStream, FinishReason, GenerationRequest, ModelClient, ProviderChunk};
use crate::error::HelmError;

/// One scripted reply, consumed per `stream` call in order.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Emit the chunks, then end the stream.
    Chunks(Vec<ProviderChunk>),
    /// Emit the chunks, sleeping `delay` before each one.
    Paced {
        chunks: Vec<ProviderChunk>,
        delay: Duration,
    },
    /// Emit the chunks, then never yield again.
    Stall(Vec<ProviderChunk>),
    /// Emit the chunks, then yield a stream error.
    FailAfter {
        chunks: Vec<ProviderChunk>,
        message: String,
    },
    /// Fail the call before any chunk.
    Fail(String),
    /// Fail the call with a rate-limit error.
    RateLimited(Option<u64>),
}

impl ScriptedTurn {
    /// Text reply ending with a `stop` finish.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Chunks(vec![
            ProviderChunk::text(text),
            ProviderChunk::finish(FinishReason::Stop),
        ])
    }

    /// Tool-call reply; each entry is `(id, name, arguments)`.
    pub fn tool_calls<'a>(
        calls: impl IntoIterator<Item = (&'a str, &'a str, serde_json::Value)>,
    ) -> Self {
        let mut chunks: Vec<ProviderChunk> = calls
            .into_iter()
            .map(|(id, name, args)| ProviderChunk::tool_call(id, name, args.to_string()))
            .collect();
        chunks.push(ProviderChunk::finish(FinishReason::ToolCalls));
        Self::Chunks(chunks)
    }
}

/// Client that replays [`ScriptedTurn`]s and records every request.
pub struct ScriptedClient {
    provider: String,
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedClient {
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            provider: "scripted".to_string(),
            turns: Mutex::new(turns.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_provider_name(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Scripted turns not yet consumed.
    pub fn remaining(&self) -> usize {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn ok_chunks(
    chunks: Vec<ProviderChunk>,
) -> impl futures::Stream<Item = Result<ProviderChunk, HelmError>> {
    stream::iter(chunks.into_iter().map(Ok))
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn stream(
        &self,
        request: &GenerationRequest,
        _cancel: CancellationToken,
    ) -> Result<ChunkStream, HelmError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let turn = self
            .turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| HelmError::Stream("scripted client has no turns left".to_string()))?;

        let stream = match turn {
            ScriptedTurn::Chunks(chunks) => ok_chunks(chunks).boxed(),
            ScriptedTurn::Paced { chunks, delay } => async_stream::stream! {
                for chunk in chunks {
                    tokio::time::sleep(delay).await;
                    yield Ok::<_, HelmError>(chunk);
                }
            }
            .boxed(),
            ScriptedTurn::Stall(chunks) => ok_chunks(chunks).chain(stream::pending()).boxed(),
            ScriptedTurn::FailAfter { chunks, message } => ok_chunks(chunks)
                .chain(stream::once(async move { Err(HelmError::Stream(message)) }))
                .boxed(),
            ScriptedTurn::Fail(message) => return Err(HelmError::Stream(message)),
            ScriptedTurn::RateLimited(retry_after_ms) => {
                return Err(HelmError::RateLimited { retry_after_ms })
            }
        };
        Ok(stream)
    }
}
