//! HTTP transport for streaming responses
//!
//! Opens a request configured for a streaming body and exposes the response
//! as a status code plus an ordered stream of SSE frames. Every provider
//! adapter drives one [`SseTransport`] session per send.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};

use super::sse::{SseFrame, SseParser};

/// Ordered frames of one streaming response
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame>> + Send>>;

/// Parameters for one streaming request
pub struct StreamRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,

    /// Pre-serialized request body
    pub body: String,

    /// Cancelling this token aborts the connection; no frames are yielded
    /// afterwards
    pub cancel: CancellationToken,
}

/// An open streaming session
///
/// The status is available as soon as response headers arrive, before any
/// body data is processed, so callers can reject non-2xx responses early.
pub struct SseSession {
    pub status: StatusCode,
    pub frames: FrameStream,
}

/// Shared streaming HTTP client
#[derive(Debug, Clone, Default)]
pub struct SseTransport {
    client: Client,
}

impl SseTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-configured client (proxies, timeouts, TLS options)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Open a streaming request
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] when the connection cannot be
    /// established and [`EngineError::Cancelled`] when the token fires before
    /// headers arrive.
    pub async fn open(&self, request: StreamRequest) -> Result<SseSession> {
        let send = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body)
            .send();

        let response = tokio::select! {
            biased;
            () = request.cancel.cancelled() => return Err(EngineError::Cancelled),
            response = send => response?,
        };

        let status = response.status();
        let frames = Self::frame_stream(response.bytes_stream(), request.cancel);

        Ok(SseSession {
            status,
            frames: Box::pin(frames),
        })
    }

    /// Decode the response body into SSE frames
    ///
    /// Yields at most one `Err` item, always as the last item. Ends silently
    /// when the cancellation token fires; dropping the inner response stream
    /// tears the connection down.
    fn frame_stream(
        body: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<SseFrame>> + Send {
        async_stream::stream! {
            let mut parser = SseParser::new();
            let mut body = Box::pin(body);
            // Bytes held back when a chunk ends mid-codepoint
            let mut carry: Vec<u8> = Vec::new();

            loop {
                let chunk = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    chunk = body.next() => chunk,
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        carry.extend_from_slice(&bytes);
                        let text = match std::str::from_utf8(&carry) {
                            Ok(text) => text,
                            Err(e) if e.error_len().is_none() => {
                                // Truncated codepoint at the chunk boundary;
                                // the prefix is still valid.
                                std::str::from_utf8(&carry[..e.valid_up_to()])
                                    .unwrap_or_default()
                            }
                            Err(e) => {
                                yield Err(EngineError::ParseFrame(format!(
                                    "invalid UTF-8 in stream: {e}"
                                )));
                                return;
                            }
                        };

                        let consumed = text.len();
                        for frame in parser.push(text) {
                            yield Ok(frame);
                        }
                        carry.drain(..consumed);
                    }
                    Some(Err(e)) => {
                        yield Err(EngineError::Transport(e));
                        return;
                    }
                    None => {
                        if let Some(frame) = parser.finish() {
                            yield Ok(frame);
                        }
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(url: String, cancel: CancellationToken) -> StreamRequest {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        StreamRequest {
            url,
            method: Method::POST,
            headers,
            body: "{}".to_string(),
            cancel,
        }
    }

    #[tokio::test]
    async fn status_is_available_before_frames() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/stream"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("data: one\n\n", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let transport = SseTransport::new();
        let session = transport
            .open(request(
                format!("{}/stream", server.uri()),
                CancellationToken::new(),
            ))
            .await
            .unwrap();

        assert_eq!(session.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn frames_arrive_in_emission_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "application/json"))
            .and(body_string("{}"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: first\n\ndata: second\n\ndata: third\n\n",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let transport = SseTransport::new();
        let mut session = transport
            .open(request(server.uri(), CancellationToken::new()))
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Some(frame) = session.frames.next().await {
            seen.push(frame.unwrap().data);
        }
        assert_eq!(seen, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn connection_failure_surfaces_as_transport_error() {
        let transport = SseTransport::new();
        // Nothing listens on this port.
        let result = transport
            .open(request(
                "http://127.0.0.1:9".to_string(),
                CancellationToken::new(),
            ))
            .await;

        assert!(matches!(result, Err(EngineError::Transport(_))));
    }

    #[tokio::test]
    async fn cancellation_before_connect_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let transport = SseTransport::new();
        let result = transport.open(request(server.uri(), cancel)).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn cancellation_suppresses_pending_frames() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("data: one\n\ndata: two\n\n", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let transport = SseTransport::new();
        let mut session = transport
            .open(request(server.uri(), cancel.clone()))
            .await
            .unwrap();

        cancel.cancel();
        assert!(session.frames.next().await.is_none());
    }

    #[tokio::test]
    async fn multibyte_codepoint_split_across_chunks_is_reassembled() {
        // "é" (0xC3 0xA9) is cut between the two network chunks.
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: caf\xC3")),
            Ok(Bytes::from_static(b"\xA9\n\n")),
        ];

        let mut frames = Box::pin(SseTransport::frame_stream(
            futures::stream::iter(chunks),
            CancellationToken::new(),
        ));

        let frame = frames.next().await.unwrap().unwrap();
        assert_eq!(frame.data, "café");
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn invalid_byte_sequence_ends_the_stream_with_one_error() {
        // 0xFF can never begin a UTF-8 codepoint, so this is corruption,
        // not a chunk-boundary truncation.
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: ok\n\n")),
            Ok(Bytes::from_static(b"data: \xFF\n\n")),
        ];

        let mut frames = Box::pin(SseTransport::frame_stream(
            futures::stream::iter(chunks),
            CancellationToken::new(),
        ));

        assert_eq!(frames.next().await.unwrap().unwrap().data, "ok");
        assert!(matches!(
            frames.next().await,
            Some(Err(EngineError::ParseFrame(_)))
        ));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn unterminated_trailing_frame_is_flushed_at_eof() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("data: tail", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let transport = SseTransport::new();
        let mut session = transport
            .open(request(server.uri(), CancellationToken::new()))
            .await
            .unwrap();

        let frame = session.frames.next().await.unwrap().unwrap();
        assert_eq!(frame.data, "tail");
        assert!(session.frames.next().await.is_none());
    }
}
