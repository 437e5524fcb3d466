//! Dify workflow API adapter
//!
//! Runs a workflow via `POST {base}/workflows/run` in streaming response mode
//! and translates the event stream (`text_chunk`, `workflow_finished`,
//! `error`) into the uniform engine contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{Settings, SettingsProvider};
use crate::engine::{
    Engine, FinishReason, MessageEvent, MessageIncrement, MessageRequest, MessageStream,
    ModelDescriptor,
};
use crate::error::{EngineError, Result};
use crate::streaming::{SseTransport, StreamRequest};
use crate::throttle::RequestThrottle;

/// Endpoint used when settings carry no custom URL
pub const DEFAULT_BASE_URL: &str = "https://api.dify.ai";

/// Model reported when settings carry no model name
pub const DEFAULT_MODEL: &str = "dify-translator";

/// Minimum spacing between accepted workflow runs
pub const SEND_MIN_INTERVAL: Duration = Duration::from_millis(2000);

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Adapter for the Dify workflow API
pub struct DifyEngine {
    settings: Arc<dyn SettingsProvider>,
    transport: SseTransport,
    throttle: Arc<RequestThrottle>,
}

impl DifyEngine {
    /// Create an adapter with its own transport and a fresh throttle at the
    /// default interval
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self::with_parts(
            settings,
            SseTransport::new(),
            Arc::new(RequestThrottle::new(SEND_MIN_INTERVAL)),
        )
    }

    /// Create an adapter around an existing transport and throttle
    ///
    /// Passing one shared throttle to several adapters makes them shed load
    /// as a group.
    pub fn with_parts(
        settings: Arc<dyn SettingsProvider>,
        transport: SseTransport,
        throttle: Arc<RequestThrottle>,
    ) -> Self {
        Self {
            settings,
            transport,
            throttle,
        }
    }
}

#[async_trait]
impl Engine for DifyEngine {
    fn kind(&self) -> &str {
        "dify"
    }

    async fn list_models(&self, _api_key: Option<&str>) -> Result<Vec<ModelDescriptor>> {
        // Dify workflows are selected by API key, not by model.
        Ok(Vec::new())
    }

    async fn model(&self) -> Result<String> {
        let settings = self.settings.settings().await?;
        Ok(settings
            .model_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()))
    }

    async fn send_message(&self, request: MessageRequest) -> MessageStream {
        if !self.throttle.should_accept() {
            warn!(kind = "dify", "send issued within the throttle window, dropping request");
            return MessageStream::empty();
        }

        debug!(kind = "dify", has_image = request.image_id.is_some(), "dispatching message");

        let (tx, stream) = MessageStream::channel(EVENT_CHANNEL_CAPACITY);
        let worker = SendWorker {
            settings: Arc::clone(&self.settings),
            transport: self.transport.clone(),
        };
        tokio::spawn(async move { worker.run(request, tx).await });

        stream
    }
}

/// State moved into the per-request task
struct SendWorker {
    settings: Arc<dyn SettingsProvider>,
    transport: SseTransport,
}

impl SendWorker {
    /// Drive the request to its single terminal event
    ///
    /// [`drive`](Self::drive) returns the terminal reason as a value, so the
    /// one `Finished` emission below is the only one possible per request.
    async fn run(self, request: MessageRequest, tx: mpsc::Sender<MessageEvent>) {
        let reason = match self.drive(&request, &tx).await {
            Ok(reason) => reason,
            Err(e) => {
                let _ = tx.send(MessageEvent::Error(error_message(&e))).await;
                FinishReason::Error
            }
        };
        let _ = tx.send(MessageEvent::Finished(reason)).await;
    }

    async fn drive(
        &self,
        request: &MessageRequest,
        tx: &mpsc::Sender<MessageEvent>,
    ) -> Result<FinishReason> {
        let settings = self.settings.settings().await?;
        let stream_request = build_stream_request(request, &settings)?;

        let session = match self.transport.open(stream_request).await {
            Ok(session) => session,
            Err(EngineError::Cancelled) => return Ok(FinishReason::Cancelled),
            Err(e) => return Err(e),
        };

        let status = session.status;
        if tx
            .send(MessageEvent::StatusCode(status.as_u16()))
            .await
            .is_err()
        {
            // Caller dropped the stream; nothing left to deliver to.
            return Ok(FinishReason::Cancelled);
        }
        if !status.is_success() {
            return Err(EngineError::Provider(format!(
                "Dify API returned HTTP {status}"
            )));
        }

        let mut frames = session.frames;
        while let Some(frame) = frames.next().await {
            let frame = frame?;

            // One SSE frame may batch several JSON event lines; each line is
            // parsed on its own so a bad one cannot poison the rest.
            for line in frame.data.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<WorkflowStreamEvent>(line) {
                    Ok(WorkflowStreamEvent::TextChunk { data }) => {
                        let Some(text) = data.and_then(|data| data.text) else {
                            continue;
                        };
                        let increment = MessageIncrement {
                            content: text,
                            role: String::new(),
                        };
                        if tx.send(MessageEvent::Increment(increment)).await.is_err() {
                            return Ok(FinishReason::Cancelled);
                        }
                    }
                    Ok(WorkflowStreamEvent::WorkflowFinished) => {
                        // Everything delivered so far is the final result.
                        return Ok(FinishReason::Success);
                    }
                    Ok(WorkflowStreamEvent::Error { error }) => {
                        let message = error
                            .and_then(|error| error.message)
                            .unwrap_or_else(|| "Dify API error".to_string());
                        return Err(EngineError::Provider(message));
                    }
                    Ok(WorkflowStreamEvent::Other) => {}
                    Err(e) => {
                        warn!(error = %e, line = %line, "skipping unparseable stream line");
                    }
                }
            }
        }

        // The stream ended without a terminal frame: either the caller
        // cancelled or the provider never said it was done.
        if request.cancel.is_cancelled() {
            Ok(FinishReason::Cancelled)
        } else {
            Ok(FinishReason::Timeout)
        }
    }
}

/// Human-readable detail for the `Error` event
fn error_message(e: &EngineError) -> String {
    match e {
        // Provider messages are surfaced verbatim.
        EngineError::Provider(message) => message.clone(),
        other => other.to_string(),
    }
}

fn build_stream_request(request: &MessageRequest, settings: &Settings) -> Result<StreamRequest> {
    let api_key = settings
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| EngineError::InvalidConfig("Dify API key is not configured".to_string()))?;

    let base = settings.api_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let url = format!("{}/workflows/run", base.trim_end_matches('/'));

    let query = match request.role_prompt.as_deref() {
        Some(role) if !role.is_empty() => format!("{role}\n\n{}", request.command_prompt),
        _ => request.command_prompt.clone(),
    };
    let payload = WorkflowRunRequest {
        inputs: WorkflowInputs {
            query,
            image: request.image_id.clone().map(|id| ImageAttachment {
                transfer_method: "local_file",
                upload_file_id: id,
                kind: "image",
            }),
        },
        response_mode: "streaming",
        user: "translation-user",
        stream: true,
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| EngineError::InvalidConfig("Dify API key is not a valid header".to_string()))?;
    headers.insert(AUTHORIZATION, bearer);

    Ok(StreamRequest {
        url,
        method: Method::POST,
        headers,
        body: serde_json::to_string(&payload)?,
        cancel: request.cancel.clone(),
    })
}

// Wire types for the workflow run endpoint

#[derive(Debug, Serialize)]
struct WorkflowRunRequest {
    inputs: WorkflowInputs,
    response_mode: &'static str,
    user: &'static str,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WorkflowInputs {
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<ImageAttachment>,
}

#[derive(Debug, Serialize)]
struct ImageAttachment {
    transfer_method: &'static str,
    upload_file_id: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// One line of the workflow event stream
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WorkflowStreamEvent {
    TextChunk {
        #[serde(default)]
        data: Option<TextChunkData>,
    },
    WorkflowFinished,
    Error {
        #[serde(default)]
        error: Option<ErrorDetail>,
    },
    /// Lifecycle events this engine does not act on (workflow_started,
    /// node_started, node_finished, ping, ...)
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextChunkData {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}
