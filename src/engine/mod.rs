//! Uniform engine contract
//!
//! Every backend provider (LLM APIs, workflow APIs, translation APIs) is
//! wrapped in an adapter implementing [`Engine`]. Callers build one
//! [`MessageRequest`] per send and consume the resulting [`MessageStream`];
//! adapters translate between that contract and their provider's wire format.

pub mod dify;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A uniform message request
///
/// Owned by the caller; the adapter consumes it for the duration of one send
/// and retains nothing afterwards. The cancellation token may be fired from
/// outside at any time.
#[derive(Debug, Clone)]
pub struct MessageRequest {
    /// Optional system/role prompt, prepended to the command prompt
    pub role_prompt: Option<String>,

    /// The instruction or text to process
    pub command_prompt: String,

    /// Identifier of an already-uploaded image, when the request carries one
    pub image_id: Option<String>,

    /// Cooperative cancellation for this request
    pub cancel: CancellationToken,
}

impl MessageRequest {
    pub fn new(command_prompt: impl Into<String>) -> Self {
        Self {
            role_prompt: None,
            command_prompt: command_prompt.into(),
            image_id: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// One fragment of a progressively-assembled response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageIncrement {
    pub content: String,

    /// Role tag; empty for continuation fragments
    #[serde(default)]
    pub role: String,
}

/// A selectable backend model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
}

/// Terminal outcome of a request
///
/// Exactly one is delivered per non-throttled request, always as the final
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Success,
    Error,
    Timeout,
    Cancelled,
}

/// Request-scoped events, in delivery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    /// HTTP status of the provider response, sent before any content
    StatusCode(u16),

    /// One content fragment
    Increment(MessageIncrement),

    /// Human-readable error detail; followed by `Finished(Error)`
    Error(String),

    /// Terminal signal; nothing follows it
    Finished(FinishReason),
}

/// Ordered event stream for one request
///
/// A request shed by the throttle returns a stream that yields nothing at
/// all. Every other request yields events ending in exactly one
/// [`MessageEvent::Finished`].
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<MessageEvent>,
}

impl MessageStream {
    /// Bounded channel feeding a new stream
    pub(crate) fn channel(capacity: usize) -> (mpsc::Sender<MessageEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// A stream that ends immediately without yielding anything
    pub(crate) fn empty() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self { rx }
    }

    /// Receive the next event; `None` once the request is torn down
    pub async fn next(&mut self) -> Option<MessageEvent> {
        self.rx.recv().await
    }
}

impl Stream for MessageStream {
    type Item = MessageEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Capability interface implemented by every provider adapter
#[async_trait]
pub trait Engine: Send + Sync {
    /// Adapter kind, e.g. "dify"
    fn kind(&self) -> &str;

    /// Enumerate selectable models
    ///
    /// Adapters with no selectable models return an empty vector; an empty
    /// result is not an error.
    async fn list_models(&self, api_key: Option<&str>) -> Result<Vec<ModelDescriptor>>;

    /// Resolve the active model, falling back to the adapter default when
    /// configuration has none
    async fn model(&self) -> Result<String>;

    /// Dispatch a message
    ///
    /// Runs as an independent task; progress and the terminal outcome arrive
    /// solely on the returned stream.
    async fn send_message(&self, request: MessageRequest) -> MessageStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        let mut stream = MessageStream::empty();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_preserves_event_order() {
        let (tx, mut stream) = MessageStream::channel(8);
        tx.send(MessageEvent::StatusCode(200)).await.unwrap();
        tx.send(MessageEvent::Finished(FinishReason::Success))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(stream.next().await, Some(MessageEvent::StatusCode(200)));
        assert_eq!(
            stream.next().await,
            Some(MessageEvent::Finished(FinishReason::Success))
        );
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn finish_reason_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&FinishReason::Timeout).unwrap(),
            "\"timeout\""
        );
    }
}
