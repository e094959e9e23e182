//! Event streams and the provider stream adapter.

pub mod adapter;
pub mod event_stream;
pub mod events;

pub use adapter::{stream_assistant_response, ABORTED_MESSAGE};
pub use event_stream::{EventSink, EventStream, StreamEvent};
pub use events::{AssistantMessageEvent, AssistantMessageEventStream};
