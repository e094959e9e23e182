//! Ordered event channel with a single-fulfillment result.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::HelmError;

/// Event type carried by an [`EventStream`].
///
/// An event that returns `Some` from [`terminal_output`](Self::terminal_output)
/// closes the stream and fulfills its result.
pub trait StreamEvent: Send + 'static {
    type Output: Send + 'static;

    fn terminal_output(&self) -> Option<Self::Output>;
}

struct Shared<E: StreamEvent> {
    tx: Option<mpsc::UnboundedSender<E>>,
    result_tx: Option<oneshot::Sender<E::Output>>,
}

/// Producer half. Cheap to clone; every clone feeds the same stream.
pub struct EventSink<E: StreamEvent> {
    shared: Arc<Mutex<Shared<E>>>,
    consumer_gone: CancellationToken,
}

impl<E: StreamEvent> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            consumer_gone: self.consumer_gone.clone(),
        }
    }
}

impl<E: StreamEvent> EventSink<E> {
    /// Deliver an event. No-op once the stream is closed.
    pub fn push(&self, event: E) {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = shared.tx.as_ref() else {
            return;
        };
        let output = event.terminal_output();
        let _ = tx.send(event);
        if let Some(output) = output {
            shared.tx = None;
            if let Some(result_tx) = shared.result_tx.take() {
                let _ = result_tx.send(output);
            }
        }
    }

    /// Close the stream with an explicit result. No-op once closed.
    pub fn end(&self, output: E::Output) {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        if shared.tx.take().is_none() {
            return;
        }
        if let Some(result_tx) = shared.result_tx.take() {
            let _ = result_tx.send(output);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tx
            .is_none()
    }

    /// True once the [`EventStream`] (and any pending `result()`) was dropped.
    pub fn is_abandoned(&self) -> bool {
        self.consumer_gone.is_cancelled()
    }

    /// Resolves when the consumer drops the stream.
    pub async fn abandoned(&self) {
        self.consumer_gone.cancelled().await;
    }
}

/// Consumer half: a `Stream` of events plus the run's final result.
pub struct EventStream<E: StreamEvent> {
    events: UnboundedReceiverStream<E>,
    result_rx: oneshot::Receiver<E::Output>,
    _consumer: DropGuard,
}

impl<E: StreamEvent> EventStream<E> {
    /// Create a connected sink/stream pair.
    pub fn channel() -> (EventSink<E>, EventStream<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        let consumer_gone = CancellationToken::new();
        let sink = EventSink {
            shared: Arc::new(Mutex::new(Shared {
                tx: Some(tx),
                result_tx: Some(result_tx),
            })),
            consumer_gone: consumer_gone.clone(),
        };
        let stream = EventStream {
            events: UnboundedReceiverStream::new(rx),
            result_rx,
            _consumer: consumer_gone.drop_guard(),
        };
        (sink, stream)
    }

    /// Await the final result. Undelivered events are discarded.
    pub async fn result(self) -> Result<E::Output, HelmError> {
        let EventStream {
            result_rx,
            _consumer: consumer,
            ..
        } = self;
        let output = result_rx.await.map_err(|_| {
            HelmError::Stream("event stream closed without a result".to_string())
        });
        drop(consumer);
        output
    }
}

impl<E: StreamEvent> Stream for EventStream<E> {
    type Item = E;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}
